use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::AdminUser;
use crate::api::state::AppState;
use crate::error::{AppError, Result};
use crate::models::user::{CreateUserData, Role, UpdateUserData, User};
use crate::services::password::{self, PasswordError};

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AppError::Validation(format!("invalid email: {}", email))),
    }
}

fn validate_display_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("display_name must not be empty".to_string()));
    }
    Ok(())
}

fn hash(password: &str) -> Result<String> {
    password::hash_password(password).map_err(|e| match e {
        PasswordError::TooShort => AppError::Validation(e.to_string()),
        PasswordError::Hash(msg) => AppError::Internal(anyhow::anyhow!(msg)),
    })
}

/// A parent/student link only makes sense between a parent and a student, so a
/// linked user keeps their role until the links are removed.
async fn ensure_role_change_keeps_links(state: &AppState, id: i64, role: Role) -> Result<()> {
    let Some(current) = state.store.find_user(id).await? else {
        return Ok(());
    };
    if current.role == role {
        return Ok(());
    }

    let linked = state
        .store
        .list_relationships()
        .await?
        .iter()
        .any(|r| r.parent_id == id || r.student_id == id);
    if linked {
        return Err(AppError::Conflict(format!(
            "user {} has parent/student links; remove them before changing the role",
            id
        )));
    }
    Ok(())
}

async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<ListUsersQuery>,
) -> Result<Json<Vec<User>>> {
    Ok(Json(state.store.list_users(params.role).await?))
}

async fn create_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    validate_email(&req.email)?;
    validate_display_name(&req.display_name)?;
    let password_hash = hash(&req.password)?;

    let user = state
        .store
        .create_user(CreateUserData {
            email: req.email,
            display_name: req.display_name.trim().to_string(),
            role: req.role,
            password_hash,
        })
        .await?;

    tracing::info!(admin_id = admin.id, user_id = user.id, role = %user.role, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<User>> {
    state
        .store
        .find_user(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", id)))
}

async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    if let Some(email) = &req.email {
        validate_email(email)?;
    }
    if let Some(name) = &req.display_name {
        validate_display_name(name)?;
    }
    if admin.id == id && (req.is_active == Some(false) || req.role.is_some_and(|r| r != Role::Admin)) {
        return Err(AppError::Validation(
            "admins cannot demote or deactivate themselves".to_string(),
        ));
    }
    if let Some(role) = req.role {
        ensure_role_change_keeps_links(&state, id, role).await?;
    }
    let password_hash = req.password.as_deref().map(hash).transpose()?;

    let user = state
        .store
        .update_user(
            id,
            UpdateUserData {
                email: req.email,
                display_name: req.display_name.map(|n| n.trim().to_string()),
                role: req.role,
                password_hash,
                is_active: req.is_active,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", id)))?;

    tracing::info!(admin_id = admin.id, user_id = user.id, "User updated");
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    if admin.id == id {
        return Err(AppError::Validation("admins cannot delete themselves".to_string()));
    }

    if !state.store.delete_user(id).await? {
        return Err(AppError::NotFound(format!("user {} not found", id)));
    }

    tracing::info!(admin_id = admin.id, user_id = id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}
