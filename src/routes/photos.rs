use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    models::{CanonicalImage, EmployeeId, ErrorResponse, PhotoDeleteResponse, PhotoQueryResponse, PhotoUploadResponse},
    services::photo_service::PhotoError,
    utils::security::is_allowed_photo_filename,
    AppState,
};

const ID_FIELDS: [&str; 2] = ["employee_id", "dpi"];
const FILE_FIELDS: [&str; 2] = ["photo", "foto"];

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/photos", post(upload_photo))
        .route("/api/photos/{employee_id}", get(get_photo).delete(delete_photo))
        .route("/api/photos/{employee_id}/content", get(get_photo_content))
}

pub(crate) fn parse_employee_id(raw: &str) -> Result<EmployeeId, PhotoError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PhotoError::MissingIdentifier);
    }
    EmployeeId::parse(raw).map_err(PhotoError::InvalidIdentifier)
}

fn multipart_error(e: MultipartError, max_bytes: usize) -> PhotoError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PhotoError::TooLarge { max_bytes }
    } else {
        PhotoError::MalformedUpload(e.body_text())
    }
}

/// Upload or replace an employee's photo
///
/// Multipart fields: `employee_id` (or `dpi`) and the image file `photo` (or `foto`).
#[utoipa::path(
    post,
    path = "/api/photos",
    tag = "photos",
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Photo stored", body = PhotoUploadResponse),
        (status = 400, description = "Missing identifier, missing or empty file, corrupt image", body = ErrorResponse),
        (status = 404, description = "Employee not found", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 415, description = "File type not allowed", body = ErrorResponse),
        (status = 503, description = "Photo storage unavailable", body = ErrorResponse)
    )
)]
pub async fn upload_photo(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<PhotoUploadResponse>, PhotoError> {
    let max_bytes = state.photo_service.max_upload_bytes();

    let mut raw_id: Option<String> = None;
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if ID_FIELDS.contains(&name.as_str()) {
            raw_id = Some(field.text().await.map_err(|e| multipart_error(e, max_bytes))?);
        } else if FILE_FIELDS.contains(&name.as_str()) {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(|e| multipart_error(e, max_bytes))?;
            if data.len() > max_bytes {
                return Err(PhotoError::TooLarge { max_bytes });
            }
            upload = Some((filename, data.to_vec()));
        } else {
            debug!("Ignoring unexpected multipart field {:?}", name);
        }
    }

    let employee_id = parse_employee_id(raw_id.as_deref().unwrap_or_default())?;
    let (filename, data) = upload.ok_or(PhotoError::MissingFile)?;

    if filename.trim().is_empty() || data.is_empty() {
        return Err(PhotoError::EmptyFile);
    }
    if !is_allowed_photo_filename(&filename) {
        return Err(PhotoError::UnsupportedFormat(Some(filename)));
    }

    let url = state.photo_service.replace(&employee_id, data).await?;
    info!("Photo uploaded for employee {}", employee_id);

    Ok(Json(PhotoUploadResponse { employee_id, url }))
}

/// Address of an employee's photo, or an explicit "no photo" answer
#[utoipa::path(
    get,
    path = "/api/photos/{employee_id}",
    tag = "photos",
    params(("employee_id" = String, Path, description = "Employee identifier")),
    responses(
        (status = 200, description = "Photo address, null when the employee has none", body = PhotoQueryResponse),
        (status = 400, description = "Invalid identifier", body = ErrorResponse),
        (status = 503, description = "Photo storage unavailable", body = ErrorResponse)
    )
)]
pub async fn get_photo(
    State(state): State<Arc<AppState>>,
    Path(employee_id): Path<String>,
) -> Result<Json<PhotoQueryResponse>, PhotoError> {
    let employee_id = parse_employee_id(&employee_id)?;
    let url = state.photo_service.resolve(&employee_id).await?;

    Ok(Json(PhotoQueryResponse {
        employee_id,
        attached: url.is_some(),
        url,
    }))
}

/// Remove an employee's photo
#[utoipa::path(
    delete,
    path = "/api/photos/{employee_id}",
    tag = "photos",
    params(("employee_id" = String, Path, description = "Employee identifier")),
    responses(
        (status = 200, description = "Photo detached", body = PhotoDeleteResponse),
        (status = 404, description = "Employee not found", body = ErrorResponse),
        (status = 503, description = "Record store unavailable", body = ErrorResponse)
    )
)]
pub async fn delete_photo(
    State(state): State<Arc<AppState>>,
    Path(employee_id): Path<String>,
) -> Result<Json<PhotoDeleteResponse>, PhotoError> {
    let employee_id = parse_employee_id(&employee_id)?;
    let success = state.photo_service.delete(&employee_id).await?;
    Ok(Json(PhotoDeleteResponse { success }))
}

/// Canonical JPEG bytes of an employee's photo
#[utoipa::path(
    get,
    path = "/api/photos/{employee_id}/content",
    tag = "photos",
    params(("employee_id" = String, Path, description = "Employee identifier")),
    responses(
        (status = 200, description = "Photo bytes", content_type = "image/jpeg"),
        (status = 404, description = "Employee or photo not found", body = ErrorResponse),
        (status = 503, description = "Photo storage unavailable", body = ErrorResponse)
    )
)]
pub async fn get_photo_content(
    State(state): State<Arc<AppState>>,
    Path(employee_id): Path<String>,
) -> Result<Response, PhotoError> {
    let employee_id = parse_employee_id(&employee_id)?;
    let bytes = state.photo_service.fetch(&employee_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, CanonicalImage::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        bytes,
    )
        .into_response())
}
