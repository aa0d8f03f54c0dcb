//! Login, logout and health endpoints.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;

use crate::http::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

/// Only same-site relative paths are accepted as a post-login target.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => path,
        _ => "/",
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Minimal login page posting back to `/login`.
pub fn render_login(next: &str, error: Option<&str>) -> String {
    let error = error
        .map(|e| format!("<p class=\"error\">{}</p>", escape_html(e)))
        .unwrap_or_default();
    format!(
        "<!doctype html>\n<html><head><title>Sign in</title></head><body>\n\
         <h1>Sign in</h1>\n{error}\n\
         <form method=\"post\" action=\"/login\">\n\
         <input type=\"hidden\" name=\"next\" value=\"{next}\">\n\
         <label>Username <input name=\"username\" autocomplete=\"username\"></label>\n\
         <label>Password <input name=\"password\" type=\"password\" autocomplete=\"current-password\"></label>\n\
         <button type=\"submit\">Sign in</button>\n\
         </form>\n</body></html>\n",
        next = escape_html(next),
    )
}

pub async fn login_form(Query(query): Query<LoginQuery>) -> Html<String> {
    Html(render_login(safe_next(query.next.as_deref()), None))
}

pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let next = safe_next(form.next.as_deref()).to_string();
    let username = form.username.trim();

    match state.verifier.verify(username, &form.password).await {
        Ok(true) => {
            let token = state.sessions.issue(username);
            (
                StatusCode::SEE_OTHER,
                [
                    (header::LOCATION, next),
                    (header::SET_COOKIE, state.cookies.issue(&token)),
                ],
            )
                .into_response()
        }
        Ok(false) => {
            tracing::warn!(username = %username, "Login rejected");
            (
                StatusCode::UNAUTHORIZED,
                Html(render_login(&next, Some("Invalid username or password"))),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(username = %username, error = %e, "Credential check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(render_login(&next, Some("Authentication service unavailable"))),
            )
                .into_response()
        }
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = state.gate.token(&headers) {
        if state.sessions.revoke(token) {
            tracing::info!("Session revoked");
        }
    }
    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/login".to_string()),
            (header::SET_COOKIE, state.cookies.clear()),
        ],
    )
        .into_response()
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_must_be_relative() {
        assert_eq!(safe_next(Some("/app/x?y=1")), "/app/x?y=1");
        assert_eq!(safe_next(Some("//evil.test/")), "/");
        assert_eq!(safe_next(Some("https://evil.test/")), "/");
        assert_eq!(safe_next(Some("/\\evil.test")), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn form_escapes_next() {
        let page = render_login("/a\"><script>", Some("bad"));
        assert!(page.contains("value=\"/a&quot;&gt;&lt;script&gt;\""));
        assert!(page.contains("<p class=\"error\">bad</p>"));
    }
}
