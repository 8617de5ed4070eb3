use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use libpostify::image_gen::generated_file_name;
use libpostify::scheduling::parse_schedule;
use libpostify::{
    Outcome, PlatformKind, PlatformSelection, Post, PostStatus, PublishCredentials,
    SocialAccount, User,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{bad_request, from_postify, internal, not_found, ApiError};
use crate::AppState;

/// Upper bound for `PUT /posts/{id}/image` bodies
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub generated_image_prompt: Option<String>,
    pub status: Option<String>,
    /// RFC 3339, "YYYY-MM-DD HH:MM" (UTC) or a duration from now
    pub scheduled_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub generated_image_prompt: Option<String>,
    pub status: Option<String>,
    pub scheduled_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub platforms: BTreeMap<String, bool>,
    #[serde(default)]
    pub credentials: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub results: Vec<Outcome>,
}

#[derive(Debug, Serialize)]
pub struct ResultView {
    pub id: Option<i64>,
    pub platform: SocialAccount,
    pub success: bool,
    pub error_message: String,
    pub posted_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct GenerateImageRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateImageResponse {
    pub image_base64: String,
    pub filename: String,
}

async fn owned_post(state: &AppState, user: &User, post_id: &str) -> Result<Post, ApiError> {
    state
        .db
        .get_post(post_id)
        .await
        .map_err(from_postify)?
        .filter(|post| post.owner_id == user.id)
        .ok_or_else(|| not_found("Post"))
}

/// Apply status/schedule fields and return the status the request asks
/// for. A schedule without a status implies `scheduled`; a scheduled post
/// must carry a time. `posted` and `failed` only come from publishing.
fn apply_schedule(
    post: &mut Post,
    status: Option<&str>,
    scheduled_time: Option<&str>,
) -> Result<Option<PostStatus>, ApiError> {
    let mut requested = None;
    if let Some(input) = scheduled_time {
        post.scheduled_time = Some(parse_schedule(input).map_err(from_postify)?);
        requested = Some(PostStatus::Scheduled);
    }
    if let Some(status) = status {
        let status = status.parse::<PostStatus>().map_err(from_postify)?;
        if !matches!(status, PostStatus::Draft | PostStatus::Scheduled) {
            return Err(bad_request("Status must be draft or scheduled"));
        }
        requested = Some(status);
    }
    if let Some(status) = requested {
        post.status = status;
    }
    if post.status == PostStatus::Scheduled && post.scheduled_time.is_none() {
        return Err(bad_request("Scheduled posts need a scheduled_time"));
    }
    Ok(requested)
}

/// Drop a stored image once no post points at it. Callers hold
/// `MediaStore::lock_references`.
async fn release_image(state: &AppState, reference: &str) {
    match state.db.count_image_references(reference).await {
        Ok(0) => {
            if let Err(e) = state.media.delete(reference).await {
                warn!("Failed to delete image {}: {}", reference, e);
            }
        }
        Ok(_) => {}
        Err(e) => warn!("Failed to count references to {}: {}", reference, e),
    }
}

pub async fn list_posts(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    let posts = state.db.list_posts(&user.id).await.map_err(from_postify)?;
    Ok(Json(posts))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.trim().is_empty() {
        return Err(bad_request("Title is required"));
    }

    let mut post = Post::new(user.id.clone(), req.title, req.content);
    post.generated_image_prompt = req.generated_image_prompt;
    apply_schedule(
        &mut post,
        req.status.as_deref(),
        req.scheduled_time.as_deref(),
    )?;
    state.db.create_post(&post).await.map_err(from_postify)?;

    // Every new post is attached to the owner's Telegram account
    if let Err(e) = state
        .poster
        .resolver()
        .resolve(&user.id, PlatformKind::Telegram)
        .await
    {
        warn!("Failed to resolve Telegram account for {}: {}", user.id, e);
    }

    info!("Created post {} ({})", post.id, post.status);
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(owned_post(&state, &user, &post_id).await?))
}

pub async fn update_post(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<String>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut post = owned_post(&state, &user, &post_id).await?;

    if let Some(title) = req.title {
        if title.trim().is_empty() {
            return Err(bad_request("Title is required"));
        }
        post.title = title;
    }
    if let Some(content) = req.content {
        post.content = content;
    }
    if let Some(prompt) = req.generated_image_prompt {
        post.generated_image_prompt = Some(prompt).filter(|p| !p.is_empty());
    }
    let status = apply_schedule(
        &mut post,
        req.status.as_deref(),
        req.scheduled_time.as_deref(),
    )?;

    state
        .db
        .update_post_details(&post)
        .await
        .map_err(from_postify)?;
    if let Some(status) = status {
        state
            .db
            .set_post_status(&post.id, status, None)
            .await
            .map_err(from_postify)?;
    }
    Ok(Json(owned_post(&state, &user, &post_id).await?))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let _references = state.media.lock_references().await;
    let post = owned_post(&state, &user, &post_id).await?;
    state.db.delete_post(&post.id).await.map_err(from_postify)?;
    if let Some(reference) = &post.image {
        release_image(&state, reference).await;
    }
    info!("Deleted post {}", post.id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_image(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    owned_post(&state, &user, &post_id).await?;
    if body.is_empty() {
        return Err(bad_request("Image body is empty"));
    }
    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| bad_request("Content-Type header is required"))?;

    let _references = state.media.lock_references().await;
    let mut post = owned_post(&state, &user, &post_id).await?;
    let reference = state.media.save(&body, mime).await.map_err(from_postify)?;
    let previous = post.image.replace(reference.clone());
    state
        .db
        .set_post_image(&post.id, Some(&reference))
        .await
        .map_err(from_postify)?;

    if let Some(old) = previous.filter(|old| *old != reference) {
        release_image(&state, &old).await;
    }
    Ok(Json(post))
}

pub async fn publish(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<String>,
    Json(req): Json<PublishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post = owned_post(&state, &user, &post_id).await?;
    let selection = PlatformSelection::from_names(&req.platforms).map_err(from_postify)?;
    let credentials = PublishCredentials::from_wire(&req.credentials);

    let results = state.poster.publish(&post.id, &selection, &credentials).await;
    Ok(Json(PublishResponse { results }))
}

pub async fn results(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let post = owned_post(&state, &user, &post_id).await?;
    let history = state.db.list_results(&post.id).await.map_err(from_postify)?;

    let views: Vec<ResultView> = history
        .into_iter()
        .map(|row| ResultView {
            id: row.result.id,
            platform: row.account,
            success: row.result.success,
            error_message: row.result.error_message,
            posted_at: row.result.posted_at,
        })
        .collect();
    Ok(Json(views))
}

pub async fn generate_image(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<GenerateImageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let prompt = req.prompt.trim();
    if prompt.is_empty() {
        return Err(bad_request("Prompt is required"));
    }

    let image_base64 = state.images.generate_image(prompt).await.map_err(internal)?;
    Ok(Json(GenerateImageResponse {
        image_base64,
        filename: generated_file_name(&user.id, prompt),
    }))
}
