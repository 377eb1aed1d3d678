use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::post,
    Json, Router,
};
use std::sync::Arc;

use crate::{
    models::{ErrorResponse, RenameEmployeeRequest, RenameEmployeeResponse},
    routes::photos::parse_employee_id,
    services::photo_service::PhotoError,
    AppState,
};

/// A body that parses as JSON but not as a request carries an unusable `new_id`
fn rename_body_error(rejection: JsonRejection) -> PhotoError {
    match rejection {
        JsonRejection::JsonDataError(e) => PhotoError::InvalidIdentifier(e.body_text()),
        other => PhotoError::MalformedRequest(other.body_text()),
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/employees/{employee_id}/rename", post(rename_employee))
}

/// Change an employee's identifier. The photo follows the record.
#[utoipa::path(
    post,
    path = "/api/employees/{employee_id}/rename",
    tag = "employees",
    params(("employee_id" = String, Path, description = "Current employee identifier")),
    request_body = RenameEmployeeRequest,
    responses(
        (status = 200, description = "Employee renamed", body = RenameEmployeeResponse),
        (status = 400, description = "Invalid identifier", body = ErrorResponse),
        (status = 404, description = "Employee not found", body = ErrorResponse),
        (status = 409, description = "Target identifier already in use", body = ErrorResponse)
    )
)]
pub async fn rename_employee(
    State(state): State<Arc<AppState>>,
    Path(employee_id): Path<String>,
    payload: Result<Json<RenameEmployeeRequest>, JsonRejection>,
) -> Result<Json<RenameEmployeeResponse>, PhotoError> {
    let old_id = parse_employee_id(&employee_id)?;
    let Json(request) = payload.map_err(rename_body_error)?;
    state.photo_service.rename(&old_id, &request.new_id).await?;

    Ok(Json(RenameEmployeeResponse {
        success: true,
        employee_id: request.new_id,
    }))
}
