use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// The printed check-in code of a program. One per program.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QrCode {
    pub id: i64,
    pub program_id: i64,
    pub payload: String,
    pub location: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertQrCodeData {
    pub program_id: i64,
    pub payload: String,
    pub location: String,
}

impl QrCode {
    /// Creates the program's QR code, or replaces payload and location of the
    /// existing one and reactivates it
    pub async fn upsert(pool: &PgPool, data: UpsertQrCodeData) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO qr_codes (program_id, payload, location, is_active)
            VALUES ($1, $2, $3, TRUE)
            ON CONFLICT (program_id) DO UPDATE
            SET payload = EXCLUDED.payload,
                location = EXCLUDED.location,
                is_active = TRUE,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(data.program_id)
        .bind(&data.payload)
        .bind(&data.location)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_program_id(
        pool: &PgPool,
        program_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM qr_codes WHERE program_id = $1")
            .bind(program_id)
            .fetch_optional(pool)
            .await
    }

    /// Finds the active QR code of an active program
    pub async fn find_active_by_program_id(
        pool: &PgPool,
        program_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT q.* FROM qr_codes q
            JOIN learning_programs p ON p.id = q.program_id
            WHERE q.program_id = $1 AND q.is_active = TRUE AND p.is_active = TRUE
            "#,
        )
        .bind(program_id)
        .fetch_optional(pool)
        .await
    }

    /// Deactivates the program's QR code; returns whether one existed
    pub async fn deactivate(pool: &PgPool, program_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE qr_codes
            SET is_active = FALSE, updated_at = NOW()
            WHERE program_id = $1
            "#,
        )
        .bind(program_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
