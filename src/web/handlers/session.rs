//! Session handlers.
//!
//! Logging in happens at the identity provider; these endpoints only
//! report and end the session the request carries.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar};

use crate::auth::SessionService;
use crate::web::dto::{ApiResponse, WhoAmIResponse};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::{CurrentIdentity, SESSION_COOKIE};

/// GET /session - The identity behind the request.
pub async fn whoami(
    CurrentIdentity(identity): CurrentIdentity,
) -> Json<ApiResponse<WhoAmIResponse>> {
    let guest = identity.is_guest();
    Json(ApiResponse::new(WhoAmIResponse { identity, guest }))
}

/// DELETE /session - End the session and clear its cookie.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), ApiError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        SessionService::new(state.db.pool(), state.auth.session_ttl_secs)
            .end(cookie.value())
            .await?;
        tracing::info!("session ended");
    }
    let jar = jar.remove(Cookie::from(SESSION_COOKIE));
    Ok((jar, StatusCode::NO_CONTENT))
}
