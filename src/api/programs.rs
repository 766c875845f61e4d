use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{AdminUser, AuthenticatedUser};
use crate::api::state::AppState;
use crate::error::{AppError, Result};
use crate::models::program::{CreateProgramData, LearningProgram, UpdateProgramData};

#[derive(Debug, Deserialize)]
pub struct ListProgramsQuery {
    pub active_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProgramRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProgramRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

/// Admins see every program unless they ask for active ones; everyone else sees active programs
async fn list_programs(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ListProgramsQuery>,
) -> Result<Json<Vec<LearningProgram>>> {
    let active_only = !user.is_admin() || params.active_only.unwrap_or(false);
    Ok(Json(state.store.list_programs(active_only).await?))
}

async fn create_program(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateProgramRequest>,
) -> Result<(StatusCode, Json<LearningProgram>)> {
    let name = validate_name(&req.name)?;

    let program = state
        .store
        .create_program(CreateProgramData {
            name,
            description: req.description,
        })
        .await?;

    tracing::info!(admin_id = admin.id, program_id = program.id, "Program created");
    Ok((StatusCode::CREATED, Json(program)))
}

async fn get_program(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<LearningProgram>> {
    state
        .store
        .find_program(id)
        .await?
        .filter(|p| p.is_active || user.is_admin())
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("program {} not found", id)))
}

async fn update_program(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProgramRequest>,
) -> Result<Json<LearningProgram>> {
    let name = req.name.as_deref().map(validate_name).transpose()?;

    let program = state
        .store
        .update_program(
            id,
            UpdateProgramData {
                name,
                description: req.description,
                is_active: req.is_active,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("program {} not found", id)))?;

    tracing::info!(admin_id = admin.id, program_id = program.id, "Program updated");
    Ok(Json(program))
}

/// Soft delete: the program is deactivated and its QR code stops working
async fn deactivate_program(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state
        .store
        .update_program(
            id,
            UpdateProgramData {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("program {} not found", id)))?;

    tracing::info!(admin_id = admin.id, program_id = id, "Program deactivated");
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/programs", get(list_programs).post(create_program))
        .route(
            "/api/programs/:id",
            get(get_program)
                .put(update_program)
                .delete(deactivate_program),
        )
}
