use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::{error, info};

use wishwall_db::models::{ContributorRow, NewContent, WallRow};
use wishwall_types::api::{ContentResponse, ContributorCredentials, PostedContentResponse};
use wishwall_types::models::{ContentType, ImageRequirement, MAX_IMAGES_PER_CONTENT};

use crate::auth::AppState;
use crate::contributors::{contributor_email, join_by_passcode};
use crate::convert::content_response;
use crate::error::{ApiError, ApiResult};
use crate::storage::{ALLOWED_IMAGE_TYPES, Storage};
use crate::walls::wall_by_passcode;

/// One uploaded file from the multipart form.
#[derive(Debug)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// The fields of `POST /content`. Blank text fields count as absent.
#[derive(Debug, Default)]
pub struct ContentForm {
    pub wall_id: Option<i64>,
    pub content_type: Option<ContentType>,
    pub text: Option<String>,
    pub author_name: Option<String>,
    pub image: Option<Upload>,
    pub images: Vec<Upload>,
    pub invite_token: Option<String>,
    pub wall_url: Option<String>,
    pub wall_passcode: Option<String>,
    pub contributor_email: Option<String>,
}

/// Who is posting, once credentials check out.
enum Poster {
    /// Holder of an invite token
    Invited(ContributorRow),
    /// Passcode holder; the contributor row is created only once the post is valid
    Passcode { email: String },
}

async fn read_form(mut multipart: Multipart) -> ApiResult<ContentForm> {
    let mut form = ContentForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "image" || name == "images" {
            let upload = Upload {
                file_name: field.file_name().map(str::to_string),
                content_type: field.content_type().map(str::to_string),
                data: field.bytes().await?,
            };
            // Browsers send an empty part for an untouched file input
            if upload.data.is_empty() && upload.file_name.as_deref().is_none_or(str::is_empty) {
                continue;
            }
            if name == "image" {
                if form.image.is_some() {
                    return Err(ApiError::bad_request("Only one image allowed"));
                }
                form.image = Some(upload);
            } else {
                form.images.push(upload);
            }
            continue;
        }

        let value = field.text().await?;
        let value = Some(value).filter(|v| !v.trim().is_empty());
        match name.as_str() {
            "wall_id" => {
                form.wall_id = value
                    .map(|v| v.trim().parse::<i64>())
                    .transpose()
                    .map_err(|_| ApiError::bad_request("wall_id must be an integer"))?;
            }
            "content_type" => {
                form.content_type = value
                    .map(|v| v.trim().parse::<ContentType>())
                    .transpose()
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
            }
            "text" => form.text = value,
            "author_name" => form.author_name = value.map(|v| v.trim().to_string()),
            "invite_token" => form.invite_token = value,
            "wall_url" => form.wall_url = value,
            "wall_passcode" => form.wall_passcode = value,
            "contributor_email" => form.contributor_email = value,
            _ => {}
        }
    }

    Ok(form)
}

fn check_upload(upload: &Upload, max_upload_size: usize) -> ApiResult<()> {
    let mime = upload.content_type.as_deref().unwrap_or_default();
    if !ALLOWED_IMAGE_TYPES.contains(&mime) {
        return Err(ApiError::bad_request(format!(
            "File type not allowed. Allowed types: {}",
            ALLOWED_IMAGE_TYPES.join(", ")
        )));
    }
    if upload.data.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }
    if upload.data.len() > max_upload_size {
        return Err(ApiError::bad_request(format!(
            "File too large. Maximum size: {}MB",
            max_upload_size / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Enforces the per-type field requirements and returns the uploads to store.
fn validate_fields(
    content_type: ContentType,
    form: &ContentForm,
    max_upload_size: usize,
) -> ApiResult<Vec<&Upload>> {
    let uploads: Vec<&Upload> = match content_type.image_requirement() {
        ImageRequirement::None => Vec::new(),
        ImageRequirement::Single => {
            let image = form
                .image
                .as_ref()
                .ok_or_else(|| ApiError::bad_request("Image is required for this content type"))?;
            vec![image]
        }
        ImageRequirement::Multiple => {
            if form.images.is_empty() {
                return Err(ApiError::bad_request(
                    "At least one image is required for this content type",
                ));
            }
            if form.images.len() > MAX_IMAGES_PER_CONTENT {
                return Err(ApiError::bad_request(format!(
                    "Maximum {} images allowed",
                    MAX_IMAGES_PER_CONTENT
                )));
            }
            form.images.iter().collect()
        }
    };

    for upload in &uploads {
        check_upload(upload, max_upload_size)?;
    }

    if content_type.requires_text() && form.text.is_none() {
        return Err(ApiError::bad_request("Text is required for this content type"));
    }

    Ok(uploads)
}

/// Resolves the form's credentials to a wall and a poster. Nothing is written.
async fn authenticate(state: &AppState, form: &ContentForm) -> ApiResult<(WallRow, Poster)> {
    if let Some(token) = form.invite_token.clone() {
        let contributor = state
            .run_db(move |db| db.get_contributor_by_token(&token))
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid invite token"))?;
        if !contributor.is_active {
            return Err(ApiError::forbidden("Contributor access revoked"));
        }

        let wall_id = contributor.wall_id;
        let wall = state
            .run_db(move |db| db.get_wall(wall_id))
            .await?
            .ok_or_else(|| ApiError::not_found("Wall not found"))?;
        return Ok((wall, Poster::Invited(contributor)));
    }

    let (Some(wall_url), Some(passcode)) = (&form.wall_url, &form.wall_passcode) else {
        return Err(ApiError::bad_request(
            "Either invite_token or (wall_url + wall_passcode) must be provided",
        ));
    };

    let wall = wall_by_passcode(state, wall_url.clone(), passcode).await?;
    let email = contributor_email(form.contributor_email.as_deref())?;

    let wall_id = wall.id;
    let lookup = email.clone();
    let existing = state
        .run_db(move |db| db.get_contributor_by_email(wall_id, &lookup))
        .await?;
    if existing.is_some_and(|c| !c.is_active) {
        return Err(ApiError::forbidden("Contributor access revoked"));
    }

    Ok((wall, Poster::Passcode { email }))
}

/// Writes every upload, rolling back the ones already written on failure.
async fn store_uploads(storage: &Storage, uploads: &[&Upload]) -> ApiResult<Vec<String>> {
    let mut urls = Vec::with_capacity(uploads.len());
    for upload in uploads {
        match storage.save_image(upload.file_name.as_deref(), &upload.data).await {
            Ok(url) => urls.push(url),
            Err(e) => {
                error!("Failed to store upload: {}", e);
                storage.delete_images(&urls).await;
                return Err(ApiError::Internal);
            }
        }
    }
    Ok(urls)
}

/// POST /content: multipart post from a contributor.
pub async fn create_content(
    State(state): State<AppState>,
    WithRejection(multipart, _): WithRejection<Multipart, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let form = read_form(multipart).await?;
    let wall_id = form.wall_id.ok_or_else(|| ApiError::bad_request("wall_id is required"))?;
    let content_type = form
        .content_type
        .ok_or_else(|| ApiError::bad_request("content_type is required"))?;

    let (wall, poster) = authenticate(&state, &form).await?;
    if wall.id != wall_id {
        return Err(ApiError::bad_request("Wall ID mismatch"));
    }

    let uploads = validate_fields(content_type, &form, state.storage.max_upload_size())?;

    let (contributor, by_passcode) = match poster {
        Poster::Invited(contributor) => (contributor, false),
        Poster::Passcode { email } => (join_by_passcode(&state, &wall, email).await?, true),
    };
    if contributor.wall_id != wall.id {
        return Err(ApiError::forbidden("Not authorized to post to this wall"));
    }

    let urls = store_uploads(&state.storage, &uploads).await?;
    let (image_url, image_urls) = match content_type.image_requirement() {
        ImageRequirement::None => (None, None),
        ImageRequirement::Single => (urls.first().cloned(), None),
        ImageRequirement::Multiple => (None, Some(urls.clone())),
    };

    let contributor_id = contributor.id;
    let (contributor_email, invite_token) = if by_passcode {
        (Some(contributor.email), Some(contributor.invite_token))
    } else {
        (None, None)
    };
    let text = form.text;
    let author_name = form.author_name;
    let inserted = state
        .run_db(move |db| {
            db.create_content(&NewContent {
                wall_id,
                contributor_id,
                content_type: content_type.as_str(),
                text: text.as_deref(),
                image_url: image_url.as_deref(),
                image_urls: image_urls.as_deref(),
                author_name: author_name.as_deref(),
            })
        })
        .await;

    let content = match inserted {
        Ok(content) => content,
        Err(e) => {
            state.storage.delete_images(&urls).await;
            return Err(e);
        }
    };

    info!(
        "Contributor {} posted {} content {} to wall {}",
        contributor_id, content_type, content.id, wall_id
    );
    Ok((
        StatusCode::CREATED,
        Json(PostedContentResponse {
            content: content_response(content),
            contributor_email,
            invite_token,
        }),
    ))
}

/// GET /content/wall/{wall_id}: newest first.
pub async fn list_contents(
    State(state): State<AppState>,
    Path(wall_id): Path<i64>,
) -> ApiResult<Json<Vec<ContentResponse>>> {
    state
        .run_db(move |db| db.get_wall(wall_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Wall not found"))?;

    let contents = state.run_db(move |db| db.list_contents(wall_id)).await?;
    Ok(Json(contents.into_iter().map(content_response).collect()))
}

/// Resolves delete credentials to the contributor they identify.
async fn contributor_from_credentials(
    state: &AppState,
    creds: ContributorCredentials,
) -> ApiResult<ContributorRow> {
    let invalid = || ApiError::unauthorized("Invalid authentication");

    let contributor = match creds {
        ContributorCredentials {
            invite_token: Some(token),
            ..
        } => state.run_db(move |db| db.get_contributor_by_token(&token)).await?,
        ContributorCredentials {
            wall_url: Some(wall_url),
            wall_passcode: Some(passcode),
            contributor_email: Some(email),
            ..
        } => {
            let email = crate::auth::normalize_email(&email).ok_or_else(invalid)?;
            let wall = wall_by_passcode(state, wall_url, &passcode)
                .await
                .map_err(|_| invalid())?;
            let wall_id = wall.id;
            state
                .run_db(move |db| db.get_contributor_by_email(wall_id, &email))
                .await?
        }
        _ => None,
    };

    let contributor = contributor.ok_or_else(invalid)?;
    if !contributor.is_active {
        return Err(ApiError::forbidden("Contributor access revoked"));
    }
    Ok(contributor)
}

/// DELETE /content/{content_id}: a contributor removes their own post.
pub async fn delete_content(
    State(state): State<AppState>,
    Path(content_id): Path<i64>,
    WithRejection(Query(creds), _): WithRejection<Query<ContributorCredentials>, ApiError>,
) -> ApiResult<StatusCode> {
    let contributor = contributor_from_credentials(&state, creds).await?;

    let content = state
        .run_db(move |db| db.get_content(content_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Content not found"))?;

    if content.contributor_id != contributor.id {
        return Err(ApiError::forbidden("Not authorized to delete this content"));
    }

    state.storage.delete_images(&content.stored_images()).await;
    state.run_db(move |db| db.delete_content(content_id)).await?;

    info!("Contributor {} deleted content {}", contributor.id, content_id);
    Ok(StatusCode::NO_CONTENT)
}
