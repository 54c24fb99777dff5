use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};

use wishwall_types::api::{Claims, UserResponse};

use crate::auth::AppState;
use crate::convert::user_response;
use crate::error::ApiError;

/// The authenticated admin, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserResponse);

impl CurrentUser {
    pub fn id(&self) -> i64 {
        self.0.id
    }
}

/// Extract and validate JWT from Authorization header, then resolve it to
/// an active user.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let rejected = || ApiError::unauthorized("Could not validate credentials");

    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| rejected())?;

    let user_id = token_data.claims.sub;
    let user = state
        .run_db(move |db| db.get_user_by_id(user_id))
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(rejected)?;

    req.extensions_mut().insert(CurrentUser(user_response(&user)));
    Ok(next.run(req).await)
}
