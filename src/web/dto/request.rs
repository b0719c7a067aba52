//! Request DTOs for the HTTP API.

use serde::Deserialize;

use crate::auth::{ObjectType, PermissionRecord, Permissions};

/// Query string of `PUT /files/*path`.
#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub overwrite: bool,
}

/// Query string of `PATCH /files/*path`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateQuery {
    /// When set the request body is the new content, not JSON.
    #[serde(default)]
    pub replace: bool,
    #[serde(default)]
    pub new_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// JSON body of a metadata-only `PATCH`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateBody {
    #[serde(default)]
    pub new_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of `POST /files/*path`.
#[derive(Debug, Deserialize)]
pub struct MoveBody {
    pub destination: String,
    /// Top-level entries to move; all when absent.
    #[serde(default)]
    pub names: Option<Vec<String>>,
}

/// Optional body of `DELETE /files/*path`.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteBody {
    #[serde(default)]
    pub names: Option<Vec<String>>,
}

/// One record in `PUT /permissions/*path`; the path comes from the URL.
#[derive(Debug, Deserialize)]
pub struct PermissionEntry {
    #[serde(default)]
    pub allow: Permissions,
    #[serde(default)]
    pub deny: Permissions,
    pub object_type: ObjectType,
    #[serde(default)]
    pub object_id: String,
}

impl PermissionEntry {
    pub fn into_record(self, path: &str) -> PermissionRecord {
        PermissionRecord {
            path: path.to_string(),
            allow: self.allow,
            deny: self.deny,
            object_type: self.object_type,
            object_id: self.object_id,
        }
    }
}

/// Body of `POST /shares`.
#[derive(Debug, Deserialize)]
pub struct CreateShareBody {
    pub path: String,
    pub permissions: Permissions,
}
