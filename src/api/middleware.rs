use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::services::AuthContext;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use cookie::{time::Duration, Cookie, CookieBuilder, SameSite};
use std::sync::Arc;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "sputilities_session";

const SESSION_COOKIE_DAYS: i64 = 7;

/// An authenticated relay session with provider credentials ready to use.
pub struct RequireSession(pub AuthContext);

/// A verified session id; credentials are not loaded or refreshed.
pub struct SessionId(pub Uuid);

/// Session token from the Authorization header, the session cookie, or a
/// `token` query parameter (EventSource cannot send custom headers).
pub fn session_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    bearer
        .or_else(|| cookie_token(parts))
        .or_else(|| {
            parts.uri.query().and_then(|q| {
                q.split('&')
                    .find_map(|p| p.strip_prefix("token="))
                    .map(str::to_string)
            })
        })
        .filter(|t| !t.is_empty())
}

fn cookie_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|c| c.ok())
        .find(|c| c.name() == SESSION_COOKIE)
        .map(|c| c.value_trimmed().to_string())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SessionId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let token = session_token(parts).ok_or(AppError::Unauthorized)?;
        let claims = state.sessions.verify_token(&token)?;

        if !state.sessions.exists(claims.sub).await {
            return Err(AppError::NotAuthenticated);
        }

        Ok(SessionId(claims.sub))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let SessionId(session_id) = SessionId::from_request_parts(parts, state).await?;
        let ctx = state.sessions.context(session_id).await?;
        Ok(RequireSession(ctx))
    }
}

fn base_cookie(value: String) -> CookieBuilder<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    base_cookie(token.to_string())
        .max_age(Duration::days(SESSION_COOKIE_DAYS))
        .secure(secure)
        .build()
        .to_string()
}

pub fn clear_session_cookie() -> String {
    let mut cookie = base_cookie(String::new()).build();
    cookie.make_removal();
    cookie.to_string()
}
