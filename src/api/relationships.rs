use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{AdminUser, AuthenticatedUser};
use crate::api::state::AppState;
use crate::error::{AppError, Result};
use crate::models::{ParentStudentRelationship, Role, User};

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub parent_id: i64,
    pub student_id: i64,
}

async fn require_user_with_role(state: &AppState, id: i64, role: Role) -> Result<User> {
    let user = state
        .store
        .find_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", id)))?;
    if user.role != role {
        return Err(AppError::Validation(format!(
            "user {} is a {}, expected a {}",
            id, user.role, role
        )));
    }
    Ok(user)
}

async fn list_relationships(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<ParentStudentRelationship>>> {
    Ok(Json(state.store.list_relationships().await?))
}

async fn link(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<LinkRequest>,
) -> Result<(StatusCode, Json<ParentStudentRelationship>)> {
    require_user_with_role(&state, req.parent_id, Role::Parent).await?;
    require_user_with_role(&state, req.student_id, Role::Student).await?;

    let relationship = state
        .store
        .link_parent_student(req.parent_id, req.student_id)
        .await?;

    tracing::info!(
        admin_id = admin.id,
        parent_id = req.parent_id,
        student_id = req.student_id,
        "Parent linked to student"
    );
    Ok((StatusCode::CREATED, Json(relationship)))
}

async fn unlink(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path((parent_id, student_id)): Path<(i64, i64)>,
) -> Result<StatusCode> {
    if !state
        .store
        .unlink_parent_student(parent_id, student_id)
        .await?
    {
        return Err(AppError::NotFound("relationship not found".to_string()));
    }

    tracing::info!(admin_id = admin.id, parent_id, student_id, "Parent unlinked from student");
    Ok(StatusCode::NO_CONTENT)
}

/// Students linked to a parent; visible to admins and to that parent
async fn students_of_parent(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(parent_id): Path<i64>,
) -> Result<Json<Vec<User>>> {
    if !user.is_admin() && user.id() != parent_id {
        return Err(AppError::Forbidden);
    }

    let mut students = Vec::new();
    for id in state.store.student_ids_for_parent(parent_id).await? {
        if let Some(student) = state.store.find_user(id).await? {
            students.push(student);
        }
    }

    Ok(Json(students))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/relationships", get(list_relationships).post(link))
        .route("/api/relationships/:parent_id/:student_id", delete(unlink))
        .route("/api/parents/:id/students", get(students_of_parent))
}
