use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;
use crate::services::{check_in::CheckInError, qr_generator::QrGenerationError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    CheckIn(#[from] CheckInError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("QR rendering error: {0}")]
    QrRendering(#[from] QrGenerationError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::CheckIn(err) => match err {
                CheckInError::MalformedCode(_) => (StatusCode::BAD_REQUEST, err.code()),
                CheckInError::UnknownCode { .. } => (StatusCode::NOT_FOUND, err.code()),
                CheckInError::ExpiredCode { .. } => (StatusCode::GONE, err.code()),
                CheckInError::DuplicateCheckIn { .. } => (StatusCode::CONFLICT, err.code()),
                CheckInError::Store(StoreError::Conflict(_)) => (StatusCode::CONFLICT, "conflict"),
                CheckInError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.code()),
            },
            AppError::Store(StoreError::Conflict(_)) => (StatusCode::CONFLICT, "conflict"),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::QrRendering(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed");
        }

        let message = match &self {
            AppError::CheckIn(CheckInError::MalformedCode(_)) => {
                "This QR code is not a TrailTag check-in code.".to_string()
            }
            AppError::CheckIn(CheckInError::UnknownCode { .. }) => {
                "This check-in code is not active.".to_string()
            }
            AppError::CheckIn(CheckInError::ExpiredCode { .. }) => {
                "This check-in code has expired.".to_string()
            }
            AppError::CheckIn(CheckInError::DuplicateCheckIn { .. }) => {
                "You have already checked in to this program recently.".to_string()
            }
            AppError::Validation(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                msg.clone()
            }
            AppError::Store(StoreError::Conflict(msg)) => msg.clone(),
            AppError::Unauthorized => "Authentication required.".to_string(),
            AppError::Forbidden => "You do not have access to this resource.".to_string(),
            _ => "Internal server error".to_string(),
        };

        let retry_after = match &self {
            AppError::CheckIn(CheckInError::DuplicateCheckIn { retry_after, .. }) => {
                Some(retry_after.num_seconds().max(1))
            }
            _ => None,
        };

        let mut body = json!({
            "error": code,
            "message": message,
        });
        if let Some(secs) = retry_after {
            body["retry_after_secs"] = json!(secs);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
