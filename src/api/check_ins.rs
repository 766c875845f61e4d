use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::middleware::AuthenticatedUser;
use crate::api::state::AppState;
use crate::error::{AppError, Result};
use crate::models::check_in::{CheckInDetail, CheckInFilter};
use crate::models::Role;
use crate::services::check_in::{self, CheckInConfirmation};

const DEFAULT_PER_PAGE: i64 = 50;
const MAX_PER_PAGE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    /// The raw string read from the QR code
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ListCheckInsQuery {
    pub program_id: Option<i64>,
    pub student_id: Option<i64>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CheckInPage {
    pub items: Vec<CheckInDetail>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

/// Clamps paging input to `page >= 1`, `1 <= per_page <= MAX_PER_PAGE`
pub fn page_bounds(page: Option<i64>, per_page: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    (page, per_page)
}

/// Rows to skip for a clamped page; saturates instead of overflowing on huge pages
pub fn page_offset(page: i64, per_page: i64) -> i64 {
    (page - 1).saturating_mul(per_page)
}

/// Scan endpoint: records a check-in for the calling student
async fn create_check_in(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CheckInRequest>,
) -> Result<(StatusCode, Json<CheckInConfirmation>)> {
    user.require_role(Role::Student)?;

    let confirmation = check_in::check_in(
        state.store.as_ref(),
        &state.rules,
        user.id(),
        &req.code,
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(confirmation)))
}

/// Builds the listing filter a user is allowed to see
async fn scoped_filter(
    state: &AppState,
    user: &AuthenticatedUser,
    params: &ListCheckInsQuery,
) -> Result<CheckInFilter> {
    let student_ids = match user.role() {
        Role::Admin => params.student_id.map(|id| vec![id]),
        Role::Student => {
            if params.student_id.is_some_and(|id| id != user.id()) {
                return Err(AppError::Forbidden);
            }
            Some(vec![user.id()])
        }
        Role::Parent => {
            let children = state.store.student_ids_for_parent(user.id()).await?;
            match params.student_id {
                Some(id) if !children.contains(&id) => return Err(AppError::Forbidden),
                Some(id) => Some(vec![id]),
                None => Some(children),
            }
        }
    };

    Ok(CheckInFilter {
        student_ids,
        program_id: params.program_id,
    })
}

async fn list_check_ins(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ListCheckInsQuery>,
) -> Result<Json<CheckInPage>> {
    let filter = scoped_filter(&state, &user, &params).await?;
    let (page, per_page) = page_bounds(params.page, params.per_page);

    let items = state
        .store
        .list_check_ins(&filter, per_page, page_offset(page, per_page))
        .await?;
    let total = state.store.count_check_ins(&filter).await?;

    Ok(Json(CheckInPage {
        items,
        page,
        per_page,
        total,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/check-ins", get(list_check_ins).post(create_check_in))
}
