use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::{Store, StoreError};
use crate::models::{
    check_in::{
        CheckIn, CheckInDetail, CheckInFilter, CheckInOutcome, CreateCheckInData,
        ProgramCheckInCount,
    },
    program::{CreateProgramData, LearningProgram, UpdateProgramData},
    qr_code::{QrCode, UpsertQrCodeData},
    relationship::ParentStudentRelationship,
    user::{normalize_email, CreateUserData, Role, UpdateUserData, User},
};

/// Process-local store with the same constraints as the PostgreSQL schema.
///
/// Used by the test suite and by `STORAGE=memory` local runs. A single lock
/// guards all tables, which also makes the duplicate check and insert atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    programs: BTreeMap<i64, LearningProgram>,
    // keyed by program id
    qr_codes: BTreeMap<i64, QrCode>,
    check_ins: Vec<CheckIn>,
    relationships: Vec<ParentStudentRelationship>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn detail(&self, check_in: &CheckIn) -> CheckInDetail {
        CheckInDetail {
            id: check_in.id,
            student_id: check_in.student_id,
            student_name: self
                .users
                .get(&check_in.student_id)
                .map(|u| u.display_name.clone())
                .unwrap_or_default(),
            program_id: check_in.program_id,
            program_name: self
                .programs
                .get(&check_in.program_id)
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            location: check_in.location.clone(),
            checked_in_at: check_in.checked_in_at,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_user(&self, data: CreateUserData) -> Result<User, StoreError> {
        let mut tables = self.inner.lock().await;
        let email = normalize_email(&data.email);
        if tables.email_taken(&email, None) {
            return Err(StoreError::Conflict(format!("email {} already exists", email)));
        }

        let now = Utc::now();
        let user = User {
            id: tables.next_id(),
            email,
            display_name: data.display_name,
            role: data.role,
            password_hash: data.password_hash,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        let tables = self.inner.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .users
            .values()
            .filter(|u| role.map_or(true, |r| u.role == r))
            .cloned()
            .collect())
    }

    async fn update_user(&self, id: i64, data: UpdateUserData) -> Result<Option<User>, StoreError> {
        let mut tables = self.inner.lock().await;
        let email = data.email.as_deref().map(normalize_email);
        if let Some(email) = &email {
            if tables.email_taken(email, Some(id)) {
                return Err(StoreError::Conflict(format!("email {} already exists", email)));
            }
        }

        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = email {
            user.email = email;
        }
        if let Some(display_name) = data.display_name {
            user.display_name = display_name;
        }
        if let Some(role) = data.role {
            user.role = role;
        }
        if let Some(password_hash) = data.password_hash {
            user.password_hash = password_hash;
        }
        if let Some(is_active) = data.is_active {
            user.is_active = is_active;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.inner.lock().await;
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }
        tables.check_ins.retain(|c| c.student_id != id);
        tables
            .relationships
            .retain(|r| r.parent_id != id && r.student_id != id);
        Ok(true)
    }

    async fn count_users(&self, role: Role) -> Result<i64, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables.users.values().filter(|u| u.role == role).count() as i64)
    }

    async fn create_program(&self, data: CreateProgramData) -> Result<LearningProgram, StoreError> {
        let mut tables = self.inner.lock().await;
        let now = Utc::now();
        let program = LearningProgram {
            id: tables.next_id(),
            name: data.name,
            description: data.description,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.programs.insert(program.id, program.clone());
        Ok(program)
    }

    async fn find_program(&self, id: i64) -> Result<Option<LearningProgram>, StoreError> {
        Ok(self.inner.lock().await.programs.get(&id).cloned())
    }

    async fn list_programs(&self, active_only: bool) -> Result<Vec<LearningProgram>, StoreError> {
        let tables = self.inner.lock().await;
        let mut programs: Vec<LearningProgram> = tables
            .programs
            .values()
            .filter(|p| !active_only || p.is_active)
            .cloned()
            .collect();
        programs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(programs)
    }

    async fn update_program(
        &self,
        id: i64,
        data: UpdateProgramData,
    ) -> Result<Option<LearningProgram>, StoreError> {
        let mut tables = self.inner.lock().await;
        let Some(program) = tables.programs.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = data.name {
            program.name = name;
        }
        if let Some(description) = data.description {
            program.description = Some(description);
        }
        if let Some(is_active) = data.is_active {
            program.is_active = is_active;
        }
        program.updated_at = Utc::now();
        Ok(Some(program.clone()))
    }

    async fn count_active_programs(&self) -> Result<i64, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables.programs.values().filter(|p| p.is_active).count() as i64)
    }

    async fn upsert_qr_code(&self, data: UpsertQrCodeData) -> Result<QrCode, StoreError> {
        let mut tables = self.inner.lock().await;
        if !tables.programs.contains_key(&data.program_id) {
            return Err(StoreError::Conflict(format!(
                "program {} does not exist",
                data.program_id
            )));
        }

        let now = Utc::now();
        let id = match tables.qr_codes.get(&data.program_id) {
            Some(existing) => existing.id,
            None => tables.next_id(),
        };
        let created_at = tables
            .qr_codes
            .get(&data.program_id)
            .map_or(now, |existing| existing.created_at);

        let qr_code = QrCode {
            id,
            program_id: data.program_id,
            payload: data.payload,
            location: data.location,
            is_active: true,
            created_at,
            updated_at: now,
        };
        tables.qr_codes.insert(qr_code.program_id, qr_code.clone());
        Ok(qr_code)
    }

    async fn find_qr_code(&self, program_id: i64) -> Result<Option<QrCode>, StoreError> {
        Ok(self.inner.lock().await.qr_codes.get(&program_id).cloned())
    }

    async fn find_active_qr_code(&self, program_id: i64) -> Result<Option<QrCode>, StoreError> {
        let tables = self.inner.lock().await;
        let program_active = tables
            .programs
            .get(&program_id)
            .map_or(false, |p| p.is_active);
        if !program_active {
            return Ok(None);
        }
        Ok(tables
            .qr_codes
            .get(&program_id)
            .filter(|q| q.is_active)
            .cloned())
    }

    async fn deactivate_qr_code(&self, program_id: i64) -> Result<bool, StoreError> {
        let mut tables = self.inner.lock().await;
        match tables.qr_codes.get_mut(&program_id) {
            Some(qr_code) => {
                qr_code.is_active = false;
                qr_code.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_check_in_unless_recent(
        &self,
        data: CreateCheckInData,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<CheckInOutcome, StoreError> {
        let mut tables = self.inner.lock().await;
        if !tables.users.contains_key(&data.student_id)
            || !tables.programs.contains_key(&data.program_id)
        {
            return Err(StoreError::Conflict(
                "check-in references a missing student or program".to_string(),
            ));
        }

        let cutoff = now - window;
        let previous = tables
            .check_ins
            .iter()
            .filter(|c| {
                c.student_id == data.student_id
                    && c.program_id == data.program_id
                    && c.checked_in_at > cutoff
            })
            .max_by_key(|c| c.checked_in_at)
            .cloned();
        if let Some(previous) = previous {
            return Ok(CheckInOutcome::Duplicate { previous });
        }

        let check_in = CheckIn {
            id: tables.next_id(),
            student_id: data.student_id,
            program_id: data.program_id,
            qr_code_id: data.qr_code_id,
            location: data.location,
            checked_in_at: now,
        };
        tables.check_ins.push(check_in.clone());
        Ok(CheckInOutcome::Recorded(check_in))
    }

    async fn list_check_ins(
        &self,
        filter: &CheckInFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CheckInDetail>, StoreError> {
        let tables = self.inner.lock().await;
        let mut matching: Vec<&CheckIn> = tables
            .check_ins
            .iter()
            .filter(|c| filter.matches(c))
            .collect();
        matching.sort_by(|a, b| {
            b.checked_in_at
                .cmp(&a.checked_in_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|c| tables.detail(c))
            .collect())
    }

    async fn count_check_ins(&self, filter: &CheckInFilter) -> Result<i64, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables.check_ins.iter().filter(|c| filter.matches(c)).count() as i64)
    }

    async fn count_check_ins_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .check_ins
            .iter()
            .filter(|c| c.checked_in_at >= since)
            .count() as i64)
    }

    async fn check_in_counts_by_program(
        &self,
        student_id: i64,
    ) -> Result<Vec<ProgramCheckInCount>, StoreError> {
        let tables = self.inner.lock().await;
        let mut counts: BTreeMap<i64, i64> = BTreeMap::new();
        for check_in in tables.check_ins.iter().filter(|c| c.student_id == student_id) {
            *counts.entry(check_in.program_id).or_default() += 1;
        }

        let mut rows: Vec<ProgramCheckInCount> = counts
            .into_iter()
            .map(|(program_id, check_ins)| ProgramCheckInCount {
                program_id,
                program_name: tables
                    .programs
                    .get(&program_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_default(),
                check_ins,
            })
            .collect();
        rows.sort_by(|a, b| a.program_name.cmp(&b.program_name));
        Ok(rows)
    }

    async fn link_parent_student(
        &self,
        parent_id: i64,
        student_id: i64,
    ) -> Result<ParentStudentRelationship, StoreError> {
        let mut tables = self.inner.lock().await;
        if !tables.users.contains_key(&parent_id) || !tables.users.contains_key(&student_id) {
            return Err(StoreError::Conflict(
                "relationship references a missing user".to_string(),
            ));
        }

        if let Some(existing) = tables
            .relationships
            .iter()
            .find(|r| r.parent_id == parent_id && r.student_id == student_id)
        {
            return Ok(existing.clone());
        }

        let relationship = ParentStudentRelationship {
            parent_id,
            student_id,
            created_at: Utc::now(),
        };
        tables.relationships.push(relationship.clone());
        Ok(relationship)
    }

    async fn unlink_parent_student(
        &self,
        parent_id: i64,
        student_id: i64,
    ) -> Result<bool, StoreError> {
        let mut tables = self.inner.lock().await;
        let before = tables.relationships.len();
        tables
            .relationships
            .retain(|r| !(r.parent_id == parent_id && r.student_id == student_id));
        Ok(tables.relationships.len() < before)
    }

    async fn list_relationships(&self) -> Result<Vec<ParentStudentRelationship>, StoreError> {
        let tables = self.inner.lock().await;
        let mut relationships = tables.relationships.clone();
        relationships.sort_by_key(|r| (r.parent_id, r.student_id));
        Ok(relationships)
    }

    async fn student_ids_for_parent(&self, parent_id: i64) -> Result<Vec<i64>, StoreError> {
        let tables = self.inner.lock().await;
        let mut ids: Vec<i64> = tables
            .relationships
            .iter()
            .filter(|r| r.parent_id == parent_id)
            .map(|r| r.student_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
