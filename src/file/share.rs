//! Share links.
//!
//! A share grants a fixed permission set on a path to anyone holding its
//! id. The set is frozen at creation and never exceeds what the issuer had.

use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use super::{Download, FileService, SHARE_ID_LENGTH};
use crate::auth::{Identity, Permission, Permissions};
use crate::db::{File, FileRepository, NewShare, Share, ShareRepository};
use crate::path;
use crate::storage::ObjectStore;
use crate::{DriveError, Result};

/// Attempts at finding an unused share id.
const ID_ATTEMPTS: usize = 5;

const ID_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// A share and the files it currently covers.
#[derive(Debug, Clone, Serialize)]
pub struct SharedFiles {
    pub share: Share,
    pub files: Vec<File>,
}

fn generate_id() -> String {
    let mut rng = rand::rng();
    (0..SHARE_ID_LENGTH)
        .map(|_| ID_CHARS[rng.random_range(0..ID_CHARS.len())] as char)
        .collect()
}

impl<S: ObjectStore> FileService<S> {
    /// Issue a share on `path`.
    ///
    /// # Permission Check
    ///
    /// The issuer needs `Share` on the path, and `permissions` must be a
    /// subset of the issuer's effective permissions there.
    pub async fn create_share(
        &self,
        identity: &Identity,
        path: &str,
        permissions: Permissions,
    ) -> Result<Share> {
        let path = path::normalize(path);
        if permissions.is_empty() {
            return Err(DriveError::Validation(
                "a share needs at least one permission".to_string(),
            ));
        }
        if identity.is_guest() {
            return Err(DriveError::Unauthorized {
                path,
                needed: Permission::Share,
            });
        }

        let pool = self.db.pool();
        let effective = self.resolver.file_permissions(pool, &path, identity).await?;
        if !effective.has(Permission::Share) {
            return Err(DriveError::Unauthorized {
                path,
                needed: Permission::Share,
            });
        }
        if let Some(missing) = permissions.remove(effective).iter().next() {
            return Err(DriveError::Unauthorized {
                path,
                needed: missing,
            });
        }
        if FileRepository::new(pool).find_files(&path).await?.is_empty() {
            return Err(DriveError::FileNotFound(path));
        }

        let shares = ShareRepository::new(pool);
        for _ in 0..ID_ATTEMPTS {
            let new = NewShare {
                id: generate_id(),
                path: path.clone(),
                permissions,
                user_id: identity.subject.clone(),
            };
            match shares.create(&new).await {
                Ok(share) => {
                    info!(id = %share.id, path = %path, %permissions, by = %identity.subject, "share created");
                    return Ok(share);
                }
                Err(DriveError::Validation(msg)) => warn!(%msg, "share id collision, retrying"),
                Err(e) => return Err(e),
            }
        }
        Err(DriveError::Validation(
            "could not allocate a share id".to_string(),
        ))
    }

    /// Look up a share and the files below its path.
    ///
    /// Needs no identity; the id is the credential. A share without `Read`
    /// lists no files.
    pub async fn open_share(&self, id: &str) -> Result<SharedFiles> {
        let pool = self.db.pool();
        let share = ShareRepository::new(pool).get(id).await?;
        let files = if share.permissions.has(Permission::Read) {
            FileRepository::new(pool).find_files(&share.path).await?
        } else {
            Vec::new()
        };
        Ok(SharedFiles { share, files })
    }

    /// Download a file through a share.
    pub async fn download_shared(
        &self,
        id: &str,
        file_path: &str,
        range_header: Option<&str>,
    ) -> Result<Download> {
        let pool = self.db.pool();
        let share = ShareRepository::new(pool).get(id).await?;
        let file_path = path::normalize(file_path);
        if !share.permissions.has(Permission::Read) {
            return Err(DriveError::Unauthorized {
                path: file_path,
                needed: Permission::Read,
            });
        }
        if file_path != share.path && !path::is_descendant(&file_path, &share.path) {
            return Err(DriveError::FileNotFound(file_path));
        }
        let file = FileRepository::new(pool).get(&file_path).await?;
        self.open(file, range_header).await
    }

    /// Revoke a share. Only its issuer or an admin may.
    pub async fn delete_share(&self, identity: &Identity, id: &str) -> Result<()> {
        let shares = ShareRepository::new(self.db.pool());
        let share = shares.get(id).await?;
        if share.user_id != identity.subject && !self.resolver.is_admin(identity) {
            return Err(DriveError::Unauthorized {
                path: share.path,
                needed: Permission::Share,
            });
        }
        shares.delete(id).await?;
        info!(id, by = %identity.subject, "share deleted");
        Ok(())
    }

    /// Shares issued by the caller.
    pub async fn list_shares(&self, identity: &Identity) -> Result<Vec<Share>> {
        ShareRepository::new(self.db.pool())
            .list_by_user(&identity.subject)
            .await
    }
}
