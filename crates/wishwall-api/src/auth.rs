use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::{error, info};

use wishwall_db::Database;
use wishwall_types::api::{Claims, LoginRequest, RegisterRequest, TokenResponse, UserResponse};

use crate::convert::user_response;
use crate::error::{ApiError, ApiResult};
use crate::mailer::InviteMailer;
use crate::middleware::CurrentUser;
use crate::storage::Storage;

const MIN_PASSWORD_LEN: usize = 8;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub storage: Storage,
    pub mailer: Arc<dyn InviteMailer>,
    /// Base URL of the web client, used in invite links
    pub frontend_url: String,
}

impl AppStateInner {
    /// Run a blocking DB call off the async runtime.
    pub async fn run_db<F, T>(self: &Arc<Self>, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || f(&state.db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal
            })?
            .map_err(ApiError::from)
    }
}

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let email = normalize_email(&req.email).ok_or_else(|| ApiError::bad_request("Invalid email address"))?;
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    let full_name = req.full_name.trim().to_string();
    if full_name.is_empty() {
        return Err(ApiError::bad_request("Full name is required"));
    }

    let lookup = email.clone();
    if state.run_db(move |db| db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(ApiError::bad_request("Email already registered"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Password hashing failed: {}", e);
            ApiError::Internal
        })?
        .to_string();

    let user = state
        .run_db(move |db| db.create_user(&email, &full_name, &password_hash))
        .await?;
    info!("Registered user {} ({})", user.id, user.email);

    let access_token = create_token(&state.jwt_secret, state.token_ttl, user.id, &user.email)?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            access_token,
            token_type: "bearer".into(),
            user: user_response(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> ApiResult<Json<TokenResponse>> {
    let bad_credentials = || ApiError::unauthorized("Incorrect email or password");

    let email = normalize_email(&req.email).ok_or_else(bad_credentials)?;
    let user = state
        .run_db(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(bad_credentials)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password).map_err(|e| {
        error!("Stored hash for user {} is unreadable: {}", user.id, e);
        ApiError::Internal
    })?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| bad_credentials())?;

    if !user.is_active {
        return Err(ApiError::forbidden("Inactive user"));
    }

    let access_token = create_token(&state.jwt_secret, state.token_ttl, user.id, &user.email)?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".into(),
        user: user_response(&user),
    }))
}

pub async fn me(Extension(user): Extension<CurrentUser>) -> Json<UserResponse> {
    Json(user.0)
}

pub fn create_token(
    secret: &str,
    ttl: chrono::Duration,
    user_id: i64,
    email: &str,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Lower-cased, trimmed email if it looks deliverable.
pub(crate) fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;

    let valid = !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace);

    valid.then_some(email)
}
