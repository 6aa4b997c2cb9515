// Login, token check, logout and the `/api` auth middleware.

use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use super::AppState;
use crate::auth::{AuthService, token};
use crate::error::{PanelError, Result};
use crate::models::{LoginRequest, LoginResponse, TokenLoginRequest, UserProfile};

/// Resolves the caller and stores their profile as a request extension.
pub(super) async fn require_user(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let user = if state.auth.enabled() {
        let token = token::from_headers(req.headers()).ok_or(PanelError::TokenExpiredOrMissing)?;
        state.auth.verify(&token).await?
    } else {
        AuthService::anonymous()
    };
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// POST /auth/login
pub(super) async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    Ok(Json(state.auth.login(&req).await?))
}

/// POST /auth/login/token: checks a stored token and returns its profile.
pub(super) async fn login_token(
    State(state): State<AppState>,
    Json(req): Json<TokenLoginRequest>,
) -> Result<Json<UserProfile>> {
    let token = token::from_cookie_value(&req.token).ok_or(PanelError::TokenExpiredOrMissing)?;
    Ok(Json(state.auth.verify(&token).await?))
}

/// POST /auth/logout
pub(super) async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    if let Some(token) = token::from_headers(&headers) {
        state.auth.logout(&token).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/user
pub(super) async fn me(Extension(user): Extension<UserProfile>) -> Json<UserProfile> {
    Json(user)
}
