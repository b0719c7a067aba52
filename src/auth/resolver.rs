//! Effective permission calculation.
//!
//! Records on every ancestor of a path contribute. Everyone and group
//! records accumulate together, user records separately, and any deny bit
//! found anywhere on the chain wins over any allow bit.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::auth::{Identity, ObjectType, Permissions, PermissionRecord};
use crate::config::AuthConfig;
use crate::db::{DbPool, File, FileRepository, PermissionRepository};
use crate::path;
use crate::Result;

/// Resolves effective permissions for an identity.
#[derive(Debug, Clone)]
pub struct Resolver {
    access_control: bool,
    admin_group: String,
}

impl Resolver {
    /// Create a resolver that enforces records, with `admin_group` bypassing them.
    pub fn new(admin_group: impl Into<String>) -> Self {
        Self {
            access_control: true,
            admin_group: admin_group.into(),
        }
    }

    /// A resolver that grants everything to everyone.
    pub fn disabled() -> Self {
        Self {
            access_control: false,
            admin_group: String::new(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        if config.enabled {
            Self::new(config.admin_group.clone())
        } else {
            Self::disabled()
        }
    }

    /// Whether the identity bypasses all checks.
    pub fn is_admin(&self, identity: &Identity) -> bool {
        !self.access_control || identity.in_group(&self.admin_group)
    }

    /// Effective permissions on `path`.
    ///
    /// `owner` is the owner of the file at exactly `path`, if one exists.
    /// `records` may contain records for unrelated paths; they are ignored.
    pub fn resolve(
        &self,
        path: &str,
        identity: &Identity,
        owner: Option<&str>,
        records: &[PermissionRecord],
    ) -> Permissions {
        if self.is_admin(identity) {
            return Permissions::ALL;
        }
        if owner.is_some_and(|o| o == identity.subject) && !identity.is_guest() {
            return Permissions::ALL;
        }
        calculate(&path::ancestors(path), records, identity)
    }

    /// Effective permissions on one path, fetching what is needed.
    pub async fn file_permissions(
        &self,
        pool: &DbPool,
        path: &str,
        identity: &Identity,
    ) -> Result<Permissions> {
        if self.is_admin(identity) {
            return Ok(Permissions::ALL);
        }
        let owner = FileRepository::new(pool).owner_of(path).await?;
        if owner.as_deref() == Some(identity.subject.as_str()) && !identity.is_guest() {
            return Ok(Permissions::ALL);
        }
        let records = PermissionRepository::new(pool)
            .get_for_paths(&path::ancestors(path))
            .await?;
        let perms = calculate(&path::ancestors(path), &records, identity);
        debug!(path, subject = %identity.subject, %perms, "resolved permissions");
        Ok(perms)
    }

    /// Effective permissions for each file, with one record query for the
    /// union of all ancestor chains.
    pub async fn files_permissions(
        &self,
        pool: &DbPool,
        files: &[File],
        identity: &Identity,
    ) -> Result<HashMap<String, Permissions>> {
        if self.is_admin(identity) {
            return Ok(files
                .iter()
                .map(|f| (f.path.clone(), Permissions::ALL))
                .collect());
        }

        let all_paths: BTreeSet<String> = files
            .iter()
            .flat_map(|f| path::ancestors(&f.path))
            .collect();
        let all_paths: Vec<String> = all_paths.into_iter().collect();
        let records = if all_paths.is_empty() {
            Vec::new()
        } else {
            PermissionRepository::new(pool).get_for_paths(&all_paths).await?
        };

        Ok(files
            .iter()
            .map(|f| {
                let perms = self.resolve(&f.path, identity, Some(&f.owner_id), &records);
                (f.path.clone(), perms)
            })
            .collect())
    }

    /// Effective permissions on paths that hold no file yet, such as move
    /// destinations. No ownership bypass applies.
    pub async fn paths_permissions(
        &self,
        pool: &DbPool,
        paths: &[String],
        identity: &Identity,
    ) -> Result<HashMap<String, Permissions>> {
        if self.is_admin(identity) {
            return Ok(paths
                .iter()
                .map(|p| (p.clone(), Permissions::ALL))
                .collect());
        }

        let all_paths: BTreeSet<String> = paths.iter().flat_map(|p| path::ancestors(p)).collect();
        let all_paths: Vec<String> = all_paths.into_iter().collect();
        let records = PermissionRepository::new(pool).get_for_paths(&all_paths).await?;

        Ok(paths
            .iter()
            .map(|p| (p.clone(), self.resolve(p, identity, None, &records)))
            .collect())
    }
}

/// Merge the records found on `chain` for `identity`.
pub fn calculate(chain: &[String], records: &[PermissionRecord], identity: &Identity) -> Permissions {
    let mut group_allow = Permissions::NONE;
    let mut group_deny = Permissions::NONE;
    let mut user_allow = Permissions::NONE;
    let mut user_deny = Permissions::NONE;

    for level in chain {
        for record in records.iter().filter(|r| &r.path == level) {
            match record.object_type {
                ObjectType::Everyone => {
                    group_allow = group_allow | record.allow;
                    group_deny = group_deny | record.deny;
                }
                ObjectType::Group if identity.in_group(&record.object_id) => {
                    group_allow = group_allow | record.allow;
                    group_deny = group_deny | record.deny;
                }
                ObjectType::User
                    if !identity.is_guest() && record.object_id == identity.subject =>
                {
                    user_allow = user_allow | record.allow;
                    user_deny = user_deny | record.deny;
                }
                _ => {}
            }
        }
    }

    (group_allow | user_allow).remove(group_deny | user_deny)
}
