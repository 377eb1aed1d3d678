use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::EmployeeId;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PhotoUploadResponse {
    pub employee_id: EmployeeId,
    /// Resolvable address of the stored canonical image
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PhotoQueryResponse {
    pub employee_id: EmployeeId,
    pub attached: bool,
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PhotoDeleteResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RenameEmployeeRequest {
    pub new_id: EmployeeId,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RenameEmployeeResponse {
    pub success: bool,
    pub employee_id: EmployeeId,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
