use crate::api::middleware::{clear_session_cookie, session_cookie, session_token, SessionId};
use crate::api::AppState;
use crate::error::{AppError, Result};
use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", get(login_url))
        .route("/auth/callback", get(callback))
        .route("/auth/check", get(check))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
        // routes kept for older front ends
        .route("/login", get(login_redirect))
        .route("/login/callback", get(callback))
        .route("/access", get(refresh))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn login_url(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let url = state.sessions.begin_login().await?;
    Ok(Json(json!({ "redirectUrl": url })))
}

async fn login_redirect(State(state): State<Arc<AppState>>) -> Result<Redirect> {
    let url = state.sessions.begin_login().await?;
    Ok(Redirect::temporary(&url))
}

async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Response> {
    if let Some(error) = params.error {
        // The user declined, or the provider refused the request
        tracing::warn!("Authorization denied: {}", error);
        return Ok(Redirect::to(&frontend_callback(&state, Some(&error))?).into_response());
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("Missing authorization code".to_string()))?;
    let login_state = params
        .state
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Auth("Missing login state".to_string()))?;

    let (_, token) = state.sessions.complete_login(&code, &login_state).await?;

    let mut headers = HeaderMap::new();
    let cookie = session_cookie(&token, state.config.cookie_secure);
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid session cookie: {}", e)))?,
    );

    Ok((headers, Redirect::to(&frontend_callback(&state, None)?)).into_response())
}

fn frontend_callback(state: &AppState, error: Option<&str>) -> Result<String> {
    let mut url = Url::parse(&format!("{}/auth/callback", state.config.frontend_url))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid FRONTEND_URL: {}", e)))?;
    if let Some(error) = error {
        url.query_pairs_mut().append_pair("error", error);
    }
    Ok(url.into())
}

/// `true` when the request carries a live session.
async fn check(State(state): State<Arc<AppState>>, request: Request) -> Json<bool> {
    let (parts, _) = request.into_parts();
    let authenticated = match session_token(&parts) {
        Some(token) => match state.sessions.verify_token(&token) {
            Ok(claims) => state.sessions.exists(claims.sub).await,
            Err(_) => false,
        },
        None => false,
    };
    Json(authenticated)
}

async fn logout(State(state): State<Arc<AppState>>, SessionId(session_id): SessionId) -> Response {
    state.sessions.logout(session_id).await;

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&clear_session_cookie()) {
        headers.insert(header::SET_COOKIE, value);
    }
    (headers, Json(json!({ "loggedOut": true }))).into_response()
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    SessionId(session_id): SessionId,
) -> Result<Json<Value>> {
    state.sessions.refresh(session_id).await?;
    let expires_at = state.sessions.token_expiry(session_id).await;
    Ok(Json(json!({ "refreshed": true, "expires_at": expires_at })))
}
