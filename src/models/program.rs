use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LearningProgram {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProgramData {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProgramData {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

impl LearningProgram {
    /// Create a new program
    pub async fn create(pool: &PgPool, data: CreateProgramData) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO learning_programs (name, description)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(data.name)
        .bind(data.description)
        .fetch_one(pool)
        .await
    }

    /// Find program by ID
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM learning_programs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool, active_only: bool) -> Result<Vec<Self>, sqlx::Error> {
        let query = if active_only {
            r#"
            SELECT * FROM learning_programs
            WHERE is_active = TRUE
            ORDER BY name
            "#
        } else {
            r#"
            SELECT * FROM learning_programs
            ORDER BY name
            "#
        };

        sqlx::query_as::<_, Self>(query).fetch_all(pool).await
    }

    /// Update a program
    pub async fn update(
        pool: &PgPool,
        id: i64,
        data: UpdateProgramData,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE learning_programs
            SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                is_active = COALESCE($4, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.is_active)
        .fetch_optional(pool)
        .await
    }

    pub async fn count_active(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM learning_programs WHERE is_active = TRUE",
        )
        .fetch_one(pool)
        .await
    }
}
