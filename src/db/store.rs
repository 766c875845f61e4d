use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::StoreError;
use crate::models::{
    check_in::{CheckInDetail, CheckInFilter, CheckInOutcome, CreateCheckInData, ProgramCheckInCount},
    program::{CreateProgramData, LearningProgram, UpdateProgramData},
    qr_code::{QrCode, UpsertQrCodeData},
    relationship::ParentStudentRelationship,
    user::{CreateUserData, Role, UpdateUserData, User},
};

/// Persistence seam between the HTTP layer and the backing store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    // Users
    async fn create_user(&self, data: CreateUserData) -> Result<User, StoreError>;
    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>, StoreError>;
    async fn update_user(&self, id: i64, data: UpdateUserData) -> Result<Option<User>, StoreError>;
    async fn delete_user(&self, id: i64) -> Result<bool, StoreError>;
    async fn count_users(&self, role: Role) -> Result<i64, StoreError>;

    // Programs
    async fn create_program(&self, data: CreateProgramData) -> Result<LearningProgram, StoreError>;
    async fn find_program(&self, id: i64) -> Result<Option<LearningProgram>, StoreError>;
    async fn list_programs(&self, active_only: bool) -> Result<Vec<LearningProgram>, StoreError>;
    async fn update_program(
        &self,
        id: i64,
        data: UpdateProgramData,
    ) -> Result<Option<LearningProgram>, StoreError>;
    async fn count_active_programs(&self) -> Result<i64, StoreError>;

    // QR codes
    async fn upsert_qr_code(&self, data: UpsertQrCodeData) -> Result<QrCode, StoreError>;
    async fn find_qr_code(&self, program_id: i64) -> Result<Option<QrCode>, StoreError>;
    /// The QR code of `program_id` when both it and the program are active
    async fn find_active_qr_code(&self, program_id: i64) -> Result<Option<QrCode>, StoreError>;
    async fn deactivate_qr_code(&self, program_id: i64) -> Result<bool, StoreError>;

    // Check-ins
    /// Records the check-in unless one exists for the same student and program
    /// in `(now - window, now]`. Check and insert are atomic per student.
    async fn create_check_in_unless_recent(
        &self,
        data: CreateCheckInData,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<CheckInOutcome, StoreError>;
    async fn list_check_ins(
        &self,
        filter: &CheckInFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CheckInDetail>, StoreError>;
    async fn count_check_ins(&self, filter: &CheckInFilter) -> Result<i64, StoreError>;
    async fn count_check_ins_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError>;
    async fn check_in_counts_by_program(
        &self,
        student_id: i64,
    ) -> Result<Vec<ProgramCheckInCount>, StoreError>;

    // Parent/student links
    async fn link_parent_student(
        &self,
        parent_id: i64,
        student_id: i64,
    ) -> Result<ParentStudentRelationship, StoreError>;
    async fn unlink_parent_student(&self, parent_id: i64, student_id: i64)
        -> Result<bool, StoreError>;
    async fn list_relationships(&self) -> Result<Vec<ParentStudentRelationship>, StoreError>;
    async fn student_ids_for_parent(&self, parent_id: i64) -> Result<Vec<i64>, StoreError>;
}
