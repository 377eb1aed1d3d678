use axum::{extract::DefaultBodyLimit, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::{models, storage::local::LOCAL_PHOTO_ROUTE, AppState};

pub mod employees;
pub mod photos;

/// Room for multipart framing and the identifier field on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        photos::upload_photo,
        photos::get_photo,
        photos::delete_photo,
        photos::get_photo_content,
        employees::rename_employee,
    ),
    components(schemas(
        models::EmployeeId,
        models::PhotoUploadResponse,
        models::PhotoQueryResponse,
        models::PhotoDeleteResponse,
        models::RenameEmployeeRequest,
        models::RenameEmployeeResponse,
        models::ErrorResponse,
    )),
    tags(
        (name = "photos", description = "Employee photo attachments"),
        (name = "employees", description = "Employee identity"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

/// Full HTTP surface: JSON API, static photo files and the OpenAPI document
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.photo_service.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(photos::router())
        .merge(employees::router())
        .nest_service(LOCAL_PHOTO_ROUTE, ServeDir::new(&state.config.upload_path))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses((status = 200, description = "Service is running"))
)]
pub async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
