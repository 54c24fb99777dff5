use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use tower_http::services::ServeDir;

use wishwall_types::models::MAX_IMAGES_PER_CONTENT;

use crate::auth::{self, AppState};
use crate::contributors;
use crate::content;
use crate::middleware::require_auth;
use crate::storage::PUBLIC_PREFIX;
use crate::walls;

/// Room for the form fields on top of the image payload.
const FORM_OVERHEAD: usize = 1024 * 1024;

/// The full HTTP surface: JSON API under `/api/v1` plus uploaded images.
pub fn router(state: AppState) -> Router {
    let upload_limit = content_body_limit(state.storage.max_upload_size());

    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/walls/public/{unique_url}", get(walls::get_public_wall))
        .route("/walls/verify/{unique_url}", get(walls::verify_wall_access))
        .route("/contributors/verify/{invite_token}", get(contributors::verify_invite))
        .route("/contributors/join", post(contributors::join_wall))
        .route(
            "/content",
            post(content::create_content).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/content/wall/{wall_id}", get(content::list_contents))
        .route("/content/{content_id}", delete(content::delete_content));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/walls", get(walls::list_walls).post(walls::create_wall))
        .route(
            "/walls/{wall_id}",
            get(walls::get_wall).put(walls::update_wall).delete(walls::delete_wall),
        )
        .route("/contributors/invite", post(contributors::invite_contributor))
        .route("/contributors/wall/{wall_id}", get(contributors::list_contributors))
        .route(
            "/contributors/{contributor_id}",
            delete(contributors::remove_contributor).patch(contributors::update_contributor),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", public_routes.merge(protected_routes))
        .nest_service(PUBLIC_PREFIX, ServeDir::new(state.storage.dir()))
        .with_state(state)
}

/// Largest multipart body for a post carrying the most images allowed.
fn content_body_limit(max_upload_size: usize) -> usize {
    max_upload_size
        .saturating_mul(MAX_IMAGES_PER_CONTENT + 1)
        .saturating_add(FORM_OVERHEAD)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "WishWall API", "version": env!("CARGO_PKG_VERSION") }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
