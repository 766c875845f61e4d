use axum::{extract::State, routing::{get, post}, Json, Router};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::api::middleware::AuthenticatedUser;
use crate::api::state::AppState;
use crate::config::Config;
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::user::{CreateUserData, Role, User};
use crate::services::password;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// Exchange email + password for a bearer token
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let user = state
        .store
        .find_user_by_email(&req.email)
        .await?
        .filter(|u| u.is_active);

    // Same answer for unknown email, inactive account and wrong password
    let user = match user {
        Some(user) if password::verify_password(&req.password, &user.password_hash) => user,
        _ => {
            tracing::info!(email = %req.email, "Failed login attempt");
            return Err(AppError::Unauthorized);
        }
    };

    let issued = state.tokens.issue(user.id, Utc::now());
    tracing::info!(user_id = user.id, role = %user.role, "User logged in");

    Ok(Json(LoginResponse {
        token: issued.token,
        token_type: "Bearer",
        expires_at: issued.expires_at,
        user,
    }))
}

/// The user the presented token belongs to
async fn me(AuthenticatedUser(user): AuthenticatedUser) -> Json<User> {
    Json(user)
}

/// Creates the configured admin account when the store has no admin yet.
///
/// Returns the created user, or `None` when nothing was configured or an admin exists.
pub async fn ensure_bootstrap_admin(
    store: &dyn Store,
    config: &Config,
) -> anyhow::Result<Option<User>> {
    let (Some(email), Some(secret)) = (
        config.bootstrap_admin_email.as_ref(),
        config.bootstrap_admin_password.as_ref(),
    ) else {
        return Ok(None);
    };

    if store.count_users(Role::Admin).await? > 0 {
        return Ok(None);
    }

    let password_hash = password::hash_password(secret.expose_secret())?;
    let admin = store
        .create_user(CreateUserData {
            email: email.clone(),
            display_name: "Administrator".to_string(),
            role: Role::Admin,
            password_hash,
        })
        .await?;

    tracing::info!(user_id = admin.id, email = %admin.email, "Bootstrap admin created");
    Ok(Some(admin))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use secrecy::Secret;

    #[tokio::test]
    async fn test_bootstrap_admin_created_once() {
        let store = MemoryStore::new();
        let mut config = Config::for_memory("secret");
        config.bootstrap_admin_email = Some("Admin@TrailTag.test".to_string());
        config.bootstrap_admin_password = Some(Secret::new("change-me-now".to_string()));

        let admin = ensure_bootstrap_admin(&store, &config).await.unwrap().unwrap();
        assert_eq!(admin.email, "admin@trailtag.test");
        assert_eq!(admin.role, Role::Admin);

        assert!(ensure_bootstrap_admin(&store, &config).await.unwrap().is_none());
        assert_eq!(store.count_users(Role::Admin).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_admin_skipped_without_config() {
        let store = MemoryStore::new();
        let config = Config::for_memory("secret");
        assert!(ensure_bootstrap_admin(&store, &config).await.unwrap().is_none());
    }
}
