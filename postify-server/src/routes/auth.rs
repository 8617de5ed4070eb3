use axum::{extract::State, response::IntoResponse, Extension, Json};
use libpostify::error::IdentityError;
use libpostify::{PostifyError, User};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{bad_request, from_postify, ApiError};
use crate::middleware::SessionToken;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub user_id: String,
    pub username: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub email: String,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state
        .identity
        .register(&req.username, &req.password, &req.email)
        .await
        .map_err(from_postify)?;

    Ok(Json(json!({
        "message": "User created successfully",
        "user_id": user_id,
    })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .identity
        .login(&req.username, &req.password)
        .await
        .map_err(from_postify)?;

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        user_id: session.user.id,
        username: session.user.username,
        token: session.token,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Extension(SessionToken(token)): Extension<SessionToken>,
) -> Result<impl IntoResponse, ApiError> {
    state.identity.logout(&token).await.map_err(from_postify)?;
    info!("{} logged out", user.username);
    Ok(Json(json!({ "message": "Logged out successfully" })))
}

pub async fn profile(Extension(user): Extension<User>) -> Json<Profile> {
    Json(Profile::from(user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .identity
        .update_profile(&user, &req.email)
        .await
        .map_err(from_postify)?;
    Ok(Json(Profile::from(updated)))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .identity
        .change_password(&user, &req.old_password, &req.new_password)
        .await
        .map_err(|e| match e {
            PostifyError::Identity(IdentityError::InvalidCredentials) => {
                bad_request("Old password is incorrect")
            }
            other => from_postify(other),
        })?;

    Ok(Json(json!({ "message": "Password changed successfully" })))
}
