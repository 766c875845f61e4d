use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::middleware::AdminUser;
use crate::api::state::AppState;
use crate::error::{AppError, Result};
use crate::models::qr_code::{QrCode, UpsertQrCodeData};
use crate::services::{qr_generator, qr_payload};

#[derive(Debug, Deserialize)]
pub struct GenerateQrCodeRequest {
    pub location: String,
}

#[derive(Debug, Serialize)]
pub struct QrCodeResponse {
    #[serde(flatten)]
    pub qr_code: QrCode,
    /// `data:image/png;base64,...`, ready for an <img> tag
    pub image_data_url: String,
}

impl QrCodeResponse {
    fn render(qr_code: QrCode) -> Result<Self> {
        let png = qr_generator::generate_qr_png(&qr_code.payload)?;
        Ok(Self {
            image_data_url: format!("data:image/png;base64,{}", STANDARD.encode(png)),
            qr_code,
        })
    }
}

async fn find_qr_code(state: &AppState, program_id: i64) -> Result<QrCode> {
    state
        .store
        .find_qr_code(program_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("program {} has no QR code", program_id)))
}

async fn get_qr_code(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(program_id): Path<i64>,
) -> Result<Json<QrCodeResponse>> {
    let qr_code = find_qr_code(&state, program_id).await?;
    Ok(Json(QrCodeResponse::render(qr_code)?))
}

/// Issues a fresh code for the program, replacing any previous payload
async fn generate_qr_code(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(program_id): Path<i64>,
    Json(req): Json<GenerateQrCodeRequest>,
) -> Result<(StatusCode, Json<QrCodeResponse>)> {
    let location = req.location.trim();
    if location.is_empty() {
        return Err(AppError::Validation("location must not be empty".to_string()));
    }

    let program = state
        .store
        .find_program(program_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("program {} not found", program_id)))?;

    let payload = qr_payload::build_payload(&state.rules.scheme, program.id, location, Utc::now());
    let qr_code = state
        .store
        .upsert_qr_code(UpsertQrCodeData {
            program_id: program.id,
            payload,
            location: location.to_string(),
        })
        .await?;

    tracing::info!(
        admin_id = admin.id,
        program_id = program.id,
        qr_code_id = qr_code.id,
        "QR code issued"
    );
    Ok((StatusCode::CREATED, Json(QrCodeResponse::render(qr_code)?)))
}

async fn deactivate_qr_code(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(program_id): Path<i64>,
) -> Result<StatusCode> {
    if !state.store.deactivate_qr_code(program_id).await? {
        return Err(AppError::NotFound(format!(
            "program {} has no QR code",
            program_id
        )));
    }

    tracing::info!(admin_id = admin.id, program_id, "QR code deactivated");
    Ok(StatusCode::NO_CONTENT)
}

async fn qr_code_svg(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(program_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let qr_code = find_qr_code(&state, program_id).await?;
    let svg = qr_generator::generate_qr_svg(&qr_code.payload)?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}

async fn qr_code_png(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(program_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let qr_code = find_qr_code(&state, program_id).await?;
    let png = qr_generator::generate_qr_png(&qr_code.payload)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/programs/:id/qr-code",
            get(get_qr_code)
                .post(generate_qr_code)
                .delete(deactivate_qr_code),
        )
        .route("/api/programs/:id/qr-code.svg", get(qr_code_svg))
        .route("/api/programs/:id/qr-code.png", get(qr_code_png))
}
