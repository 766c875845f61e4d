use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckIn {
    pub id: i64,
    pub student_id: i64,
    pub program_id: i64,
    pub qr_code_id: i64,
    pub location: String,
    pub checked_in_at: DateTime<Utc>,
}

/// A check-in joined with the names a listing shows
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckInDetail {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub program_id: i64,
    pub program_name: String,
    pub location: String,
    pub checked_in_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProgramCheckInCount {
    pub program_id: i64,
    pub program_name: String,
    pub check_ins: i64,
}

#[derive(Debug, Clone)]
pub struct CreateCheckInData {
    pub student_id: i64,
    pub program_id: i64,
    pub qr_code_id: i64,
    pub location: String,
}

/// Result of a guarded insert
#[derive(Debug, Clone)]
pub enum CheckInOutcome {
    Recorded(CheckIn),
    /// A check-in for the same student and program already exists inside the window
    Duplicate { previous: CheckIn },
}

/// Which check-ins a listing covers. `student_ids: Some(vec![])` matches nothing.
#[derive(Debug, Clone, Default)]
pub struct CheckInFilter {
    pub student_ids: Option<Vec<i64>>,
    pub program_id: Option<i64>,
}

impl CheckInFilter {
    pub fn matches(&self, check_in: &CheckIn) -> bool {
        let student_ok = self
            .student_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&check_in.student_id));
        let program_ok = self
            .program_id
            .map_or(true, |id| id == check_in.program_id);
        student_ok && program_ok
    }
}

impl CheckIn {
    /// Inserts a check-in unless the student already checked in to the same
    /// program within `window` before `now`.
    ///
    /// The student's row is locked for the duration of the transaction, so
    /// concurrent submissions for one student are serialized and at most one
    /// of them lands inside the window.
    pub async fn create_unless_recent(
        pool: &PgPool,
        data: CreateCheckInData,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<CheckInOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(data.student_id)
            .fetch_optional(&mut *tx)
            .await?;

        let previous = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM check_ins
            WHERE student_id = $1 AND program_id = $2 AND checked_in_at > $3
            ORDER BY checked_in_at DESC
            LIMIT 1
            "#,
        )
        .bind(data.student_id)
        .bind(data.program_id)
        .bind(now - window)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(previous) = previous {
            tx.rollback().await?;
            return Ok(CheckInOutcome::Duplicate { previous });
        }

        let check_in = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO check_ins (student_id, program_id, qr_code_id, location, checked_in_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(data.student_id)
        .bind(data.program_id)
        .bind(data.qr_code_id)
        .bind(&data.location)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CheckInOutcome::Recorded(check_in))
    }

    /// Lists check-ins newest first
    pub async fn list(
        pool: &PgPool,
        filter: &CheckInFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CheckInDetail>, sqlx::Error> {
        sqlx::query_as::<_, CheckInDetail>(
            r#"
            SELECT c.id, c.student_id, u.display_name AS student_name,
                   c.program_id, p.name AS program_name,
                   c.location, c.checked_in_at
            FROM check_ins c
            JOIN users u ON u.id = c.student_id
            JOIN learning_programs p ON p.id = c.program_id
            WHERE ($1::BIGINT[] IS NULL OR c.student_id = ANY($1))
              AND ($2::BIGINT IS NULL OR c.program_id = $2)
            ORDER BY c.checked_in_at DESC, c.id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.student_ids.clone())
        .bind(filter.program_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool, filter: &CheckInFilter) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM check_ins
            WHERE ($1::BIGINT[] IS NULL OR student_id = ANY($1))
              AND ($2::BIGINT IS NULL OR program_id = $2)
            "#,
        )
        .bind(filter.student_ids.clone())
        .bind(filter.program_id)
        .fetch_one(pool)
        .await
    }

    pub async fn count_since(pool: &PgPool, since: DateTime<Utc>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM check_ins WHERE checked_in_at >= $1")
            .bind(since)
            .fetch_one(pool)
            .await
    }

    /// Check-in totals per program for one student
    pub async fn count_by_program_for_student(
        pool: &PgPool,
        student_id: i64,
    ) -> Result<Vec<ProgramCheckInCount>, sqlx::Error> {
        sqlx::query_as::<_, ProgramCheckInCount>(
            r#"
            SELECT c.program_id, p.name AS program_name, COUNT(*) AS check_ins
            FROM check_ins c
            JOIN learning_programs p ON p.id = c.program_id
            WHERE c.student_id = $1
            GROUP BY c.program_id, p.name
            ORDER BY p.name
            "#,
        )
        .bind(student_id)
        .fetch_all(pool)
        .await
    }
}
