//! Row → response conversions shared by the handlers.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use wishwall_db::models::{ContentRow, ContributorRow, UserRow, WallRow};
use wishwall_types::api::{ContentResponse, ContributorResponse, UserResponse, WallResponse};
use wishwall_types::models::ContentType;

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            // Parse as naive UTC and convert.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub(crate) fn user_response(row: &UserRow) -> UserResponse {
    UserResponse {
        id: row.id,
        email: row.email.clone(),
        full_name: row.full_name.clone(),
        is_active: row.is_active,
        is_admin: row.is_admin,
        created_at: parse_timestamp(&row.created_at),
    }
}

pub(crate) fn wall_response(row: WallRow) -> WallResponse {
    WallResponse {
        id: row.id,
        title: row.title,
        description: row.description,
        unique_url: row.unique_url,
        passcode: row.passcode,
        is_public: row.is_public,
        admin_id: row.admin_id,
        created_at: parse_timestamp(&row.created_at),
        updated_at: row.updated_at.as_deref().map(parse_timestamp),
    }
}

pub(crate) fn contributor_response(row: ContributorRow) -> ContributorResponse {
    ContributorResponse {
        id: row.id,
        email: row.email,
        wall_id: row.wall_id,
        is_active: row.is_active,
        invited_at: parse_timestamp(&row.invited_at),
        accepted_at: row.accepted_at.as_deref().map(parse_timestamp),
    }
}

pub(crate) fn content_response(row: ContentRow) -> ContentResponse {
    let content_type = row.content_type.parse().unwrap_or_else(|e| {
        warn!("Content {}: {}", row.id, e);
        ContentType::Text
    });

    ContentResponse {
        id: row.id,
        wall_id: row.wall_id,
        contributor_id: row.contributor_id,
        content_type,
        text: row.text,
        image_url: row.image_url,
        image_urls: row.image_urls,
        author_name: row.author_name,
        created_at: parse_timestamp(&row.created_at),
    }
}
