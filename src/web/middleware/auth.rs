//! Session identity extraction.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::{Identity, SessionService};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Cookie holding the session id.
pub const SESSION_COOKIE: &str = "session";

/// Header alternative to the cookie for non-browser clients.
pub const SESSION_HEADER: &str = "x-session-id";

/// The identity behind the request.
///
/// Requests without a session act as the guest identity. A session that is
/// unknown or expired is rejected rather than silently downgraded.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

fn session_id(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    parts
        .headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(id) = session_id(parts) else {
            return Ok(CurrentIdentity(Identity::guest(&state.auth.guest_group)));
        };
        let identity = SessionService::new(state.db.pool(), state.auth.session_ttl_secs)
            .identity(&id)
            .await?;
        Ok(CurrentIdentity(identity))
    }
}
