use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::admin::handlers::AdminError;
use crate::auth::constant_time_eq;
use crate::config::AuthConfig;
use crate::http::server::AppState;

/// Whether `username` may edit the table. An empty admin list admits every
/// authenticated user.
pub fn is_admin(config: &AuthConfig, username: &str) -> bool {
    let username = username.trim();
    config.admin_users.is_empty()
        || config
            .admin_users
            .iter()
            .any(|admin| admin.trim().eq_ignore_ascii_case(username))
}

pub fn bearer_matches(config: &AuthConfig, request: &Request) -> bool {
    let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) else {
        return false;
    };
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| constant_time_eq(token.trim().as_bytes(), key.as_bytes()))
        .unwrap_or(false)
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AdminError> {
    let auth = &state.config.auth;

    if bearer_matches(auth, &request) {
        return Ok(next.run(request).await);
    }

    match state.gate.session(request.headers()) {
        Some(session) if is_admin(auth, &session.username) => Ok(next.run(request).await),
        Some(session) => {
            tracing::warn!(username = %session.username, "Admin access denied");
            Err(AdminError::Forbidden)
        }
        None => Err(AdminError::Unauthorized),
    }
}
