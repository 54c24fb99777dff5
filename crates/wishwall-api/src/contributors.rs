use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use wishwall_db::models::{ContributorRow, WallRow};
use wishwall_types::api::{
    ContributorResponse, InviteContributorRequest, JoinWallRequest, JoinWallResponse,
    UpdateContributorRequest,
};

use crate::auth::{AppState, normalize_email};
use crate::convert::contributor_response;
use crate::error::{ApiError, ApiResult};
use crate::mailer::{self, InviteEmail};
use crate::middleware::CurrentUser;
use crate::walls::{owned_wall, wall_by_passcode};

/// 32 random bytes, URL-safe base64 without padding.
pub(crate) fn generate_invite_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Placeholder identity for contributors who join by passcode without an email.
pub(crate) fn guest_email() -> String {
    format!("guest_{}@wishingwall.local", Uuid::new_v4().simple())
}

/// Optional contributor email from a form: blank means guest, anything else
/// must be a valid address.
pub(crate) fn contributor_email(raw: Option<&str>) -> ApiResult<String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(email) => normalize_email(email).ok_or_else(|| ApiError::bad_request("Invalid email address")),
        None => Ok(guest_email()),
    }
}

/// Finds or creates the contributor for a passcode holder, refusing revoked ones.
pub(crate) async fn join_by_passcode(
    state: &AppState,
    wall: &WallRow,
    email: String,
) -> ApiResult<ContributorRow> {
    let wall_id = wall.id;
    let contributor = state
        .run_db(move |db| db.find_or_create_contributor(wall_id, &email, generate_invite_token))
        .await?;

    if !contributor.is_active {
        return Err(ApiError::forbidden("Contributor access revoked"));
    }
    Ok(contributor)
}

/// Loads a contributor and the wall they belong to, checking the caller administers it.
async fn managed_contributor(
    state: &AppState,
    contributor_id: i64,
    user: &CurrentUser,
    action: &str,
) -> ApiResult<ContributorRow> {
    let contributor = state
        .run_db(move |db| db.get_contributor(contributor_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Contributor not found"))?;

    owned_wall(state, contributor.wall_id, user, action).await?;
    Ok(contributor)
}

pub async fn invite_contributor(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    WithRejection(Json(req), _): WithRejection<Json<InviteContributorRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let email = normalize_email(&req.email).ok_or_else(|| ApiError::bad_request("Invalid email address"))?;
    let wall = owned_wall(&state, req.wall_id, &user, "invite contributors to this wall").await?;

    let wall_id = wall.id;
    let invitee = email.clone();
    let contributor = state
        .run_db(move |db| db.invite_contributor(wall_id, &invitee, generate_invite_token))
        .await?
        .ok_or_else(|| ApiError::bad_request("Contributor already invited"))?;

    info!("Contributor {} invited to wall {}", contributor.id, wall.id);

    mailer::dispatch_invite(
        state.mailer.clone(),
        InviteEmail {
            to_email: email,
            contribute_url: mailer::contribute_url(&state.frontend_url, &contributor.invite_token),
            wall_title: wall.title,
            unique_url: wall.unique_url,
            passcode: wall.passcode,
            invite_token: contributor.invite_token.clone(),
        },
    );

    Ok((StatusCode::CREATED, Json(contributor_response(contributor))))
}

pub async fn list_contributors(
    State(state): State<AppState>,
    Path(wall_id): Path<i64>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<ContributorResponse>>> {
    owned_wall(&state, wall_id, &user, "view contributors for this wall").await?;

    let contributors = state.run_db(move |db| db.list_contributors(wall_id)).await?;
    Ok(Json(contributors.into_iter().map(contributor_response).collect()))
}

/// PATCH /contributors/{id}: revoke or restore a contributor's access.
pub async fn update_contributor(
    State(state): State<AppState>,
    Path(contributor_id): Path<i64>,
    Extension(user): Extension<CurrentUser>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateContributorRequest>, ApiError>,
) -> ApiResult<Json<ContributorResponse>> {
    managed_contributor(&state, contributor_id, &user, "update this contributor").await?;

    let is_active = req.is_active;
    let contributor = state
        .run_db(move |db| db.set_contributor_active(contributor_id, is_active))
        .await?
        .ok_or_else(|| ApiError::not_found("Contributor not found"))?;

    info!(
        "Contributor {} {}",
        contributor_id,
        if is_active { "restored" } else { "revoked" }
    );
    Ok(Json(contributor_response(contributor)))
}

pub async fn remove_contributor(
    State(state): State<AppState>,
    Path(contributor_id): Path<i64>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<StatusCode> {
    managed_contributor(&state, contributor_id, &user, "remove this contributor").await?;

    let images = state.run_db(move |db| db.delete_contributor(contributor_id)).await?;
    state.storage.delete_images(&images).await;

    info!("Contributor {} removed", contributor_id);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /contributors/verify/{invite_token}
pub async fn verify_invite(
    State(state): State<AppState>,
    Path(invite_token): Path<String>,
) -> ApiResult<Json<ContributorResponse>> {
    let contributor = state
        .run_db(move |db| db.get_contributor_by_token(&invite_token))
        .await?
        .ok_or_else(|| ApiError::not_found("Invalid invite token"))?;

    Ok(Json(contributor_response(contributor)))
}

/// POST /contributors/join: passcode self-registration.
pub async fn join_wall(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<JoinWallRequest>, ApiError>,
) -> ApiResult<Json<JoinWallResponse>> {
    let email = contributor_email(req.email.as_deref())?;
    let wall = wall_by_passcode(&state, req.wall_url, &req.passcode).await?;

    let contributor = join_by_passcode(&state, &wall, email).await?;

    Ok(Json(JoinWallResponse {
        invite_token: contributor.invite_token.clone(),
        contributor: contributor_response(contributor),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_token_shape() {
        let token = generate_invite_token();
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(token.len(), 43);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(generate_invite_token(), token);
    }

    #[test]
    fn test_contributor_email() {
        assert_eq!(contributor_email(Some(" Bo@Example.com ")).unwrap(), "bo@example.com");
        assert!(contributor_email(Some("not-an-email")).is_err());

        let guest = contributor_email(Some("   ")).unwrap();
        assert!(guest.starts_with("guest_"));
        assert!(guest.ends_with("@wishingwall.local"));
        assert_ne!(contributor_email(None).unwrap(), guest);
    }
}
