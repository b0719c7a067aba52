//! driveshed - a self-hosted file drive.
//!
//! Files live in an object store (a local directory or an S3 bucket) and
//! their metadata in SQLite or PostgreSQL. Access is governed by allow/deny
//! records inherited down the path hierarchy.

pub mod auth;
pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod path;
pub mod range;
pub mod storage;
pub mod web;

pub use auth::{Identity, ObjectType, Permission, PermissionRecord, Permissions, Resolver};
pub use config::Config;
pub use db::{Database, File, User};
pub use error::{DriveError, Result};
pub use file::FileService;
pub use storage::{ObjectStore, Storage};
