//! Correlation ids.
//!
//! Every request runs inside a span carrying its correlation id, and every
//! response echoes the id in the `x-correlation-id` header. Error bodies
//! pick up the id and the request path through [`current`] and
//! [`request_path`].

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the correlation id.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Longest caller-supplied id that is reused.
const MAX_ID_LEN: usize = 128;

struct RequestContext {
    id: String,
    path: String,
}

tokio::task_local! {
    static REQUEST: RequestContext;
}

/// Correlation id of the request being handled, if any.
pub fn current() -> Option<String> {
    REQUEST.try_with(|r| r.id.clone()).ok()
}

/// URI path of the request being handled, if any.
pub fn request_path() -> Option<String> {
    REQUEST.try_with(|r| r.path.clone()).ok()
}

/// Reuse a sane caller-supplied id, otherwise mint one.
fn request_id(req: &Request<Body>) -> String {
    req.headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub async fn correlation_id(req: Request<Body>, next: Next) -> Response {
    let id = request_id(&req);
    let path = req.uri().path().to_string();
    let span = tracing::info_span!(
        "request",
        correlation_id = %id,
        method = %req.method(),
        uri = %path,
    );

    let context = RequestContext {
        id: id.clone(),
        path,
    };
    let mut response = REQUEST
        .scope(context, next.run(req))
        .instrument(span)
        .await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_HEADER), value);
    }
    response
}
