//! Middleware and extractors for the HTTP surface.

pub mod auth;
pub mod correlation;

pub use auth::{CurrentIdentity, SESSION_COOKIE, SESSION_HEADER};
pub use correlation::{correlation_id, CORRELATION_HEADER};
