//! Report generation and download.
//!
//! `POST /api/reports` takes a multipart form (patient fields + `xray` file),
//! runs the report service on a blocking thread and answers with the findings
//! and a download URL. `GET /api/reports/:file` streams the stored PDF back.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::core_state::AppContext;
use crate::report::{generate_report, PatientMetadata};

/// Multipart field carrying the radiograph.
pub const IMAGE_FIELD: &str = "xray";

#[derive(Debug, Serialize)]
pub struct CreateReportResponse {
    pub report_name: String,
    pub prompt: String,
    pub findings: String,
    pub download_url: String,
}

/// `POST /api/reports`
pub async fn create(
    State(ctx): State<Arc<AppContext>>,
    mut multipart: Multipart,
) -> Result<Json<CreateReportResponse>, ApiError> {
    let mut metadata = PatientMetadata::default();
    let mut image: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        if name == IMAGE_FIELD {
            image = Some(field.bytes().await?.to_vec());
            continue;
        }
        let slot = match name.as_str() {
            "name" => &mut metadata.name,
            "referred_by" => &mut metadata.referred_by,
            "date_taken" => &mut metadata.date_taken,
            "date_of_report" => &mut metadata.date_of_report,
            "complaint" => &mut metadata.complaint,
            "history" => &mut metadata.history,
            _ => continue,
        };
        *slot = field.text().await?.trim().to_string();
    }

    let bytes = image
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No X-ray image provided".into()))?;

    tracing::info!(upload_bytes = bytes.len(), "Report requested");

    let worker_ctx = ctx.clone();
    let outcome = tokio::task::spawn_blocking(move || generate_report(&worker_ctx, &bytes, &metadata))
        .await
        .map_err(|e| ApiError::Internal(format!("Report task failed: {e}")))??;

    Ok(Json(CreateReportResponse {
        download_url: format!("/api/reports/{}", outcome.file_name),
        report_name: outcome.report_name,
        prompt: outcome.prompt,
        findings: outcome.findings,
    }))
}

/// `GET /api/reports/:file`
pub async fn download(
    State(ctx): State<Arc<AppContext>>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let path = ctx.store().resolve_download(&file)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(format!("Reading {}: {e}", path.display())))?;

    // File name already restricted to [A-Za-z0-9_-].pdf
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file}\""))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
