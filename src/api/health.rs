use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

use crate::api::state::AppState;
use crate::config::StorageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub store: StoreProbe,
}

/// Result of a single round trip to the backing store
#[derive(Debug, Serialize)]
pub struct StoreProbe {
    pub kind: StorageKind,
    pub status: HealthStatus,
    pub response_time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 200 when the store answers a ping, 503 otherwise
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();
    let ping = state.store.ping().await;

    let store = StoreProbe {
        kind: state.config.storage,
        status: if ping.is_ok() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        },
        response_time_ms: start.elapsed().as_millis(),
        error: ping.err().map(|e| e.to_string()),
    };

    if let Some(error) = &store.error {
        tracing::warn!(%error, "Store ping failed");
    }

    let status_code = match store.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status_code,
        Json(HealthResponse {
            status: store.status,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
            store,
        }),
    )
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
