use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::middleware::AuthenticatedUser;
use crate::api::state::AppState;
use crate::error::Result;
use crate::models::check_in::{CheckInDetail, CheckInFilter, ProgramCheckInCount};
use crate::models::{Role, User};

const RECENT_LIMIT: i64 = 10;

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Dashboard {
    Admin(AdminDashboard),
    Student(StudentDashboard),
    Parent(ParentDashboard),
}

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub admins: i64,
    pub students: i64,
    pub parents: i64,
    pub active_programs: i64,
    pub check_ins_today: i64,
    pub recent_check_ins: Vec<CheckInDetail>,
}

#[derive(Debug, Serialize)]
pub struct StudentDashboard {
    pub total_check_ins: i64,
    pub by_program: Vec<ProgramCheckInCount>,
    pub recent_check_ins: Vec<CheckInDetail>,
}

#[derive(Debug, Serialize)]
pub struct ParentDashboard {
    pub students: Vec<ChildSummary>,
}

#[derive(Debug, Serialize)]
pub struct ChildSummary {
    pub student: User,
    pub total_check_ins: i64,
    pub last_check_in: Option<CheckInDetail>,
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

fn only(student_id: i64) -> CheckInFilter {
    CheckInFilter {
        student_ids: Some(vec![student_id]),
        program_id: None,
    }
}

async fn admin_dashboard(state: &AppState) -> Result<AdminDashboard> {
    let store = &state.store;
    Ok(AdminDashboard {
        admins: store.count_users(Role::Admin).await?,
        students: store.count_users(Role::Student).await?,
        parents: store.count_users(Role::Parent).await?,
        active_programs: store.count_active_programs().await?,
        check_ins_today: store.count_check_ins_since(start_of_day(Utc::now())).await?,
        recent_check_ins: store
            .list_check_ins(&CheckInFilter::default(), RECENT_LIMIT, 0)
            .await?,
    })
}

async fn student_dashboard(state: &AppState, student_id: i64) -> Result<StudentDashboard> {
    let filter = only(student_id);
    Ok(StudentDashboard {
        total_check_ins: state.store.count_check_ins(&filter).await?,
        by_program: state.store.check_in_counts_by_program(student_id).await?,
        recent_check_ins: state.store.list_check_ins(&filter, RECENT_LIMIT, 0).await?,
    })
}

async fn parent_dashboard(state: &AppState, parent_id: i64) -> Result<ParentDashboard> {
    let mut students = Vec::new();
    for student_id in state.store.student_ids_for_parent(parent_id).await? {
        let Some(student) = state.store.find_user(student_id).await? else {
            continue;
        };
        let filter = only(student_id);
        students.push(ChildSummary {
            student,
            total_check_ins: state.store.count_check_ins(&filter).await?,
            last_check_in: state
                .store
                .list_check_ins(&filter, 1, 0)
                .await?
                .into_iter()
                .next(),
        });
    }

    Ok(ParentDashboard { students })
}

/// Role-specific overview for the signed-in user
async fn dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Dashboard>> {
    let dashboard = match user.role() {
        Role::Admin => Dashboard::Admin(admin_dashboard(&state).await?),
        Role::Student => Dashboard::Student(student_dashboard(&state, user.id()).await?),
        Role::Parent => Dashboard::Parent(parent_dashboard(&state, user.id()).await?),
    };

    Ok(Json(dashboard))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/dashboard", get(dashboard))
}
