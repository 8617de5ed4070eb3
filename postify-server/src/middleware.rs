use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use libpostify::error::IdentityError;
use libpostify::PostifyError;
use tracing::error;

use crate::AppState;

/// Bearer token of the current request, for logout
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Resolve the bearer session and attach the `User` and `SessionToken`
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    let user = match state.identity.authenticate(&token).await {
        Ok(user) => user,
        Err(PostifyError::Identity(IdentityError::InvalidSession)) => {
            return Err(StatusCode::UNAUTHORIZED)
        }
        Err(e) => {
            error!("Session lookup failed: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    req.extensions_mut().insert(user);
    req.extensions_mut().insert(SessionToken(token));
    Ok(next.run(req).await)
}
