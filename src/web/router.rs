//! Router configuration.

use axum::{
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{
    create_share, delete_path, delete_root, delete_share, download_shared, get_path,
    get_permissions, get_root_permissions, list_root, list_shares, logout, move_path, open_share,
    put_permissions, put_root_permissions, update_file, upload_file, whoami, AppState,
};
use super::middleware::correlation_id;

/// Create the API router.
///
/// axum catch-alls never match an empty tail, so the root of each tree is
/// routed explicitly.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let file_routes = Router::new()
        .route("/files", get(list_root).delete(delete_root))
        .route("/files/", get(list_root).delete(delete_root))
        .route(
            "/files/*path",
            get(get_path)
                .put(upload_file)
                .patch(update_file)
                .post(move_path)
                .delete(delete_path),
        );

    let permission_routes = Router::new()
        .route(
            "/permissions",
            get(get_root_permissions).put(put_root_permissions),
        )
        .route(
            "/permissions/",
            get(get_root_permissions).put(put_root_permissions),
        )
        .route(
            "/permissions/*path",
            get(get_permissions).put(put_permissions),
        );

    let share_routes = Router::new()
        .route("/shares", get(list_shares).post(create_share))
        .route("/shares/:id", get(open_share).delete(delete_share))
        .route("/shares/:id/files/*path", get(download_shared));

    let session_routes = Router::new().route("/session", get(whoami).delete(logout));

    Router::new()
        .merge(file_routes)
        .merge(permission_routes)
        .merge(share_routes)
        .merge(session_routes)
        .merge(create_health_router())
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(correlation_id))
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router<S: Clone + Send + Sync + 'static>() -> Router<S> {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
