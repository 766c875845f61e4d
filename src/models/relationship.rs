use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// Links a parent account to a student account
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ParentStudentRelationship {
    pub parent_id: i64,
    pub student_id: i64,
    pub created_at: DateTime<Utc>,
}

impl ParentStudentRelationship {
    /// Links parent and student; linking an existing pair is a no-op
    pub async fn create(
        pool: &PgPool,
        parent_id: i64,
        student_id: i64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO parent_student_relationships (parent_id, student_id)
            VALUES ($1, $2)
            ON CONFLICT (parent_id, student_id) DO UPDATE SET parent_id = EXCLUDED.parent_id
            RETURNING *
            "#,
        )
        .bind(parent_id)
        .bind(student_id)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, parent_id: i64, student_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM parent_student_relationships WHERE parent_id = $1 AND student_id = $2",
        )
        .bind(parent_id)
        .bind(student_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM parent_student_relationships ORDER BY parent_id, student_id",
        )
        .fetch_all(pool)
        .await
    }

    /// IDs of the students linked to a parent
    pub async fn student_ids_for_parent(
        pool: &PgPool,
        parent_id: i64,
    ) -> Result<Vec<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT student_id FROM parent_student_relationships
            WHERE parent_id = $1
            ORDER BY student_id
            "#,
        )
        .bind(parent_id)
        .fetch_all(pool)
        .await
    }
}
