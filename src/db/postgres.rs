use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use super::{Store, StoreError};
use crate::models::{
    check_in::{
        CheckIn, CheckInDetail, CheckInFilter, CheckInOutcome, CreateCheckInData,
        ProgramCheckInCount,
    },
    program::{CreateProgramData, LearningProgram, UpdateProgramData},
    qr_code::{QrCode, UpsertQrCodeData},
    relationship::ParentStudentRelationship,
    user::{CreateUserData, Role, UpdateUserData, User},
};

/// sqlx-backed store over the PostgreSQL schema in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pub pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Turns constraint violations into `Conflict`, everything else stays a database error.
fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(db_err.message().to_string());
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::Conflict(db_err.message().to_string());
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, data: CreateUserData) -> Result<User, StoreError> {
        User::create(&self.pool, data).await.map_err(map_write_error)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(User::find_by_email(&self.pool, email).await?)
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>, StoreError> {
        Ok(User::list(&self.pool, role).await?)
    }

    async fn update_user(&self, id: i64, data: UpdateUserData) -> Result<Option<User>, StoreError> {
        User::update(&self.pool, id, data)
            .await
            .map_err(map_write_error)
    }

    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        Ok(User::delete(&self.pool, id).await?)
    }

    async fn count_users(&self, role: Role) -> Result<i64, StoreError> {
        Ok(User::count_by_role(&self.pool, role).await?)
    }

    async fn create_program(&self, data: CreateProgramData) -> Result<LearningProgram, StoreError> {
        Ok(LearningProgram::create(&self.pool, data).await?)
    }

    async fn find_program(&self, id: i64) -> Result<Option<LearningProgram>, StoreError> {
        Ok(LearningProgram::find_by_id(&self.pool, id).await?)
    }

    async fn list_programs(&self, active_only: bool) -> Result<Vec<LearningProgram>, StoreError> {
        Ok(LearningProgram::list(&self.pool, active_only).await?)
    }

    async fn update_program(
        &self,
        id: i64,
        data: UpdateProgramData,
    ) -> Result<Option<LearningProgram>, StoreError> {
        Ok(LearningProgram::update(&self.pool, id, data).await?)
    }

    async fn count_active_programs(&self) -> Result<i64, StoreError> {
        Ok(LearningProgram::count_active(&self.pool).await?)
    }

    async fn upsert_qr_code(&self, data: UpsertQrCodeData) -> Result<QrCode, StoreError> {
        QrCode::upsert(&self.pool, data)
            .await
            .map_err(map_write_error)
    }

    async fn find_qr_code(&self, program_id: i64) -> Result<Option<QrCode>, StoreError> {
        Ok(QrCode::find_by_program_id(&self.pool, program_id).await?)
    }

    async fn find_active_qr_code(&self, program_id: i64) -> Result<Option<QrCode>, StoreError> {
        Ok(QrCode::find_active_by_program_id(&self.pool, program_id).await?)
    }

    async fn deactivate_qr_code(&self, program_id: i64) -> Result<bool, StoreError> {
        Ok(QrCode::deactivate(&self.pool, program_id).await?)
    }

    async fn create_check_in_unless_recent(
        &self,
        data: CreateCheckInData,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<CheckInOutcome, StoreError> {
        CheckIn::create_unless_recent(&self.pool, data, now, window)
            .await
            .map_err(map_write_error)
    }

    async fn list_check_ins(
        &self,
        filter: &CheckInFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CheckInDetail>, StoreError> {
        Ok(CheckIn::list(&self.pool, filter, limit, offset).await?)
    }

    async fn count_check_ins(&self, filter: &CheckInFilter) -> Result<i64, StoreError> {
        Ok(CheckIn::count(&self.pool, filter).await?)
    }

    async fn count_check_ins_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        Ok(CheckIn::count_since(&self.pool, since).await?)
    }

    async fn check_in_counts_by_program(
        &self,
        student_id: i64,
    ) -> Result<Vec<ProgramCheckInCount>, StoreError> {
        Ok(CheckIn::count_by_program_for_student(&self.pool, student_id).await?)
    }

    async fn link_parent_student(
        &self,
        parent_id: i64,
        student_id: i64,
    ) -> Result<ParentStudentRelationship, StoreError> {
        ParentStudentRelationship::create(&self.pool, parent_id, student_id)
            .await
            .map_err(map_write_error)
    }

    async fn unlink_parent_student(
        &self,
        parent_id: i64,
        student_id: i64,
    ) -> Result<bool, StoreError> {
        Ok(ParentStudentRelationship::delete(&self.pool, parent_id, student_id).await?)
    }

    async fn list_relationships(&self) -> Result<Vec<ParentStudentRelationship>, StoreError> {
        Ok(ParentStudentRelationship::list_all(&self.pool).await?)
    }

    async fn student_ids_for_parent(&self, parent_id: i64) -> Result<Vec<i64>, StoreError> {
        Ok(ParentStudentRelationship::student_ids_for_parent(&self.pool, parent_id).await?)
    }
}
