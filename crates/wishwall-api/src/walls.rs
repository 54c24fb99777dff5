use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use rand::{Rng, distr::Alphanumeric};
use tracing::info;

use wishwall_db::models::{NewWall, WallChanges, WallRow};
use wishwall_types::api::{
    CreateWallRequest, PasscodeQuery, PublicWallResponse, UpdateWallRequest, WallResponse,
};

use crate::auth::AppState;
use crate::convert::{content_response, wall_response};
use crate::error::{ApiError, ApiResult};
use crate::middleware::CurrentUser;

const SLUG_LEN: usize = 12;
const PASSCODE_LEN: usize = 6;

pub(crate) fn generate_slug() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(SLUG_LEN)
        .map(char::from)
        .collect()
}

pub(crate) fn generate_passcode() -> String {
    let mut rng = rand::rng();
    (0..PASSCODE_LEN)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Loads a wall the caller administers. 404 if missing, 403 if owned by
/// someone else.
pub(crate) async fn owned_wall(
    state: &AppState,
    wall_id: i64,
    user: &CurrentUser,
    action: &str,
) -> ApiResult<WallRow> {
    let wall = state
        .run_db(move |db| db.get_wall(wall_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Wall not found"))?;

    if wall.admin_id != user.id() {
        return Err(ApiError::forbidden(format!("Not authorized to {}", action)));
    }
    Ok(wall)
}

/// Loads a wall by its public slug and checks the shared passcode.
pub(crate) async fn wall_by_passcode(
    state: &AppState,
    unique_url: String,
    passcode: &str,
) -> ApiResult<WallRow> {
    let wall = state
        .run_db(move |db| db.get_wall_by_url(&unique_url))
        .await?
        .ok_or_else(|| ApiError::not_found("Wall not found"))?;

    if wall.passcode != passcode {
        return Err(ApiError::unauthorized("Invalid passcode"));
    }
    Ok(wall)
}

pub async fn create_wall(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    WithRejection(Json(req), _): WithRejection<Json<CreateWallRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }

    let description = req.description;
    let passcode = generate_passcode();
    let admin_id = user.id();

    let wall = state
        .run_db(move |db| {
            db.create_wall(
                &NewWall {
                    title: &title,
                    description: description.as_deref(),
                    passcode: &passcode,
                    admin_id,
                },
                generate_slug,
            )
        })
        .await?;

    info!("User {} created wall {} ({})", admin_id, wall.id, wall.unique_url);
    Ok((StatusCode::CREATED, Json(wall_response(wall))))
}

pub async fn list_walls(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<WallResponse>>> {
    let admin_id = user.id();
    let walls = state.run_db(move |db| db.list_walls_by_admin(admin_id)).await?;
    Ok(Json(walls.into_iter().map(wall_response).collect()))
}

pub async fn get_wall(
    State(state): State<AppState>,
    Path(wall_id): Path<i64>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<WallResponse>> {
    let wall = owned_wall(&state, wall_id, &user, "access this wall").await?;
    Ok(Json(wall_response(wall)))
}

pub async fn update_wall(
    State(state): State<AppState>,
    Path(wall_id): Path<i64>,
    Extension(user): Extension<CurrentUser>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateWallRequest>, ApiError>,
) -> ApiResult<Json<WallResponse>> {
    owned_wall(&state, wall_id, &user, "update this wall").await?;

    let title = req.title.map(|t| t.trim().to_string());
    if title.as_deref().is_some_and(str::is_empty) {
        return Err(ApiError::bad_request("Title cannot be empty"));
    }

    let description = req.description;
    let is_public = req.is_public;
    let wall = state
        .run_db(move |db| {
            db.update_wall(
                wall_id,
                &WallChanges {
                    title: title.as_deref(),
                    description: description.as_deref(),
                    is_public,
                },
            )
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Wall not found"))?;

    Ok(Json(wall_response(wall)))
}

pub async fn delete_wall(
    State(state): State<AppState>,
    Path(wall_id): Path<i64>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<StatusCode> {
    owned_wall(&state, wall_id, &user, "delete this wall").await?;

    let images = state.run_db(move |db| db.delete_wall(wall_id)).await?;
    state.storage.delete_images(&images).await;

    info!("Wall {} deleted ({} images removed)", wall_id, images.len());
    Ok(StatusCode::NO_CONTENT)
}

/// GET /walls/public/{unique_url}?passcode=: the wall page with all posts.
pub async fn get_public_wall(
    State(state): State<AppState>,
    Path(unique_url): Path<String>,
    WithRejection(Query(query), _): WithRejection<Query<PasscodeQuery>, ApiError>,
) -> ApiResult<Json<PublicWallResponse>> {
    let wall = wall_by_passcode(&state, unique_url, &query.passcode).await?;

    let wall_id = wall.id;
    let contents = state.run_db(move |db| db.list_contents(wall_id)).await?;

    Ok(Json(PublicWallResponse {
        id: wall.id,
        title: wall.title,
        description: wall.description,
        unique_url: wall.unique_url,
        is_public: wall.is_public,
        contents: contents.into_iter().map(content_response).collect(),
    }))
}

/// GET /walls/verify/{unique_url}?passcode=: checks access before a
/// contributor starts posting.
pub async fn verify_wall_access(
    State(state): State<AppState>,
    Path(unique_url): Path<String>,
    WithRejection(Query(query), _): WithRejection<Query<PasscodeQuery>, ApiError>,
) -> ApiResult<Json<WallResponse>> {
    let wall = wall_by_passcode(&state, unique_url, &query.passcode).await?;
    Ok(Json(wall_response(wall)))
}
