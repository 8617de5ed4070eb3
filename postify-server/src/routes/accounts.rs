use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use libpostify::{ContentStore, PlatformKind, SocialAccount, User};
use serde::Deserialize;
use tracing::info;

use crate::error::{bad_request, from_postify, not_found, ApiError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub platform: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub chat_id: String,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAccountRequest {
    pub display_name: Option<String>,
    pub token: Option<String>,
    pub chat_id: Option<String>,
    pub is_active: Option<bool>,
}

async fn owned_account(
    state: &AppState,
    user: &User,
    account_id: &str,
) -> Result<SocialAccount, ApiError> {
    state
        .db
        .get_account(account_id)
        .await
        .map_err(from_postify)?
        .filter(|account| account.owner_id == user.id)
        .ok_or_else(|| not_found("Account"))
}

pub async fn list_accounts(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    let accounts = state.db.list_accounts(&user.id).await.map_err(from_postify)?;
    Ok(Json(accounts))
}

pub async fn create_account(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let platform: PlatformKind = req.platform.parse().map_err(from_postify)?;

    if state
        .db
        .find_account(&user.id, platform)
        .await
        .map_err(from_postify)?
        .is_some()
    {
        return Err(bad_request(format!(
            "An account for {} already exists",
            platform.display_name()
        )));
    }

    let mut account = SocialAccount::placeholder(&user.id, platform);
    if let Some(name) = req.display_name.filter(|n| !n.trim().is_empty()) {
        account.display_name = name;
    }
    account.token = req.token;
    account.chat_id = req.chat_id;
    account.is_active = req.is_active.unwrap_or(true);

    let stored = state
        .db
        .create_account(&account)
        .await
        .map_err(from_postify)?;
    info!("Created {} account {} for {}", platform, stored.id, user.id);
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn update_account(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(account_id): Path<String>,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut account = owned_account(&state, &user, &account_id).await?;

    if let Some(name) = req.display_name {
        account.display_name = name;
    }
    if let Some(token) = req.token {
        account.token = token;
    }
    if let Some(chat_id) = req.chat_id {
        account.chat_id = chat_id;
    }
    if let Some(active) = req.is_active {
        account.is_active = active;
    }

    state.db.update_account(&account).await.map_err(from_postify)?;
    Ok(Json(account))
}

pub async fn delete_account(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(account_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let account = owned_account(&state, &user, &account_id).await?;
    state
        .db
        .delete_account(&account.id)
        .await
        .map_err(from_postify)?;
    Ok(StatusCode::NO_CONTENT)
}
