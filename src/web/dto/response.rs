//! Response DTOs for the HTTP API.

use serde::Serialize;

use crate::auth::{Identity, PermissionRecord, Permissions};

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Records on a path plus the caller's effective permissions there.
#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    pub path: String,
    pub effective: Permissions,
    pub records: Vec<PermissionRecord>,
}

/// The caller as the server sees them.
#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    #[serde(flatten)]
    pub identity: Identity,
    pub guest: bool,
}
