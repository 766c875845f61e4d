// API module - HTTP endpoints

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod auth;
pub mod check_ins;
pub mod dashboard;
pub mod health;
pub mod middleware;
pub mod programs;
pub mod qr_codes;
pub mod relationships;
pub mod state;
pub mod users;

pub use state::AppState;

/// Full application router with tracing and CORS applied
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(users::router())
        .merge(programs::router())
        .merge(qr_codes::router())
        .merge(check_ins::router())
        .merge(relationships::router())
        .merge(dashboard::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
