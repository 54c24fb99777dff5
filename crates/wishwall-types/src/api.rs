use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ContentType;

// -- JWT Claims --

/// Bearer token claims issued to wall admins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Returned by both register and login.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserResponse,
}

// -- Walls --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateWallRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateWallRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

/// Full wall as seen by its admin (and by holders of the passcode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub unique_url: String,
    pub passcode: String,
    pub is_public: bool,
    pub admin_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Wall as rendered on the public page: no passcode, no owner.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicWallResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub unique_url: String,
    pub is_public: bool,
    pub contents: Vec<ContentResponse>,
}

#[derive(Debug, Deserialize)]
pub struct PasscodeQuery {
    pub passcode: String,
}

// -- Contributors --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InviteContributorRequest {
    pub email: String,
    pub wall_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateContributorRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinWallRequest {
    pub wall_url: String,
    pub passcode: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributorResponse {
    pub id: i64,
    pub email: String,
    pub wall_id: i64,
    pub is_active: bool,
    pub invited_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinWallResponse {
    pub contributor: ContributorResponse,
    pub invite_token: String,
}

// -- Content --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentResponse {
    pub id: i64,
    pub wall_id: i64,
    pub contributor_id: i64,
    pub content_type: ContentType,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub image_urls: Option<Vec<String>>,
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Reply to `POST /content`. Posts made with the wall passcode also carry
/// the contributor identity they were filed under, which is what later
/// deletes must present.
#[derive(Debug, Serialize, Deserialize)]
pub struct PostedContentResponse {
    #[serde(flatten)]
    pub content: ContentResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_token: Option<String>,
}

/// Credentials accepted when a contributor deletes their own post.
#[derive(Debug, Default, Deserialize)]
pub struct ContributorCredentials {
    pub invite_token: Option<String>,
    pub wall_url: Option<String>,
    pub wall_passcode: Option<String>,
    pub contributor_email: Option<String>,
}
