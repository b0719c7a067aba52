//! HTTP surface.
//!
//! Thin axum handlers over [`crate::file::FileService`]: path-addressed file
//! operations, permission records, shares and the current session.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::create_router;
pub use server::WebServer;
