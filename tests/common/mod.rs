//! Shared fixtures for the integration tests
//!
//! - In-process fakes for `SpotifyApi` and `TokenEndpoint`
//! - A mock provider served over real HTTP for the reqwest clients
//! - Request/response helpers for driving the router with `oneshot`

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get as route_get, post},
    Form, Json, Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sputilities::error::{AppError, Result};
use sputilities::models::spotify::{Paging, PlaylistObject, SavedTrackObject, SearchResponse};
use sputilities::models::{Operation, TokenPair, TokenResponse, UserProfile};
use sputilities::services::pipeline::CancelFlag;
use sputilities::services::{AuthContext, SpotifyApi, TokenEndpoint};
use sputilities::{AppState, Config};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

pub const SESSION_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub fn test_config(accounts_url: &str, api_url: &str) -> Config {
    let accounts_url = accounts_url.to_string();
    let api_url = api_url.to_string();
    Config::from_lookup(move |key| match key {
        "SPOTIFY_CLIENT_ID" => Some("client-id".to_string()),
        "SPOTIFY_CLIENT_SECRET" => Some("client-secret".to_string()),
        "SPOTIFY_REDIRECT_URI" => {
            Some("http://localhost:3600/api/v1/login/callback".to_string())
        }
        "SESSION_SECRET" => Some(SESSION_SECRET.to_string()),
        "FRONTEND_URL" => Some("http://localhost:5173".to_string()),
        "SPOTIFY_ACCOUNTS_URL" => Some(accounts_url.clone()),
        "SPOTIFY_API_URL" => Some(api_url.clone()),
        _ => None,
    })
    .expect("test config should be valid")
}

pub fn token_pair(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenPair {
    TokenPair::from_response(
        TokenResponse {
            access_token: access.to_string(),
            token_type: Some("Bearer".to_string()),
            scope: None,
            expires_in: Some(expires_in),
            refresh_token: refresh.map(str::to_string),
        },
        None,
    )
}

pub fn track_uri(index: usize) -> String {
    format!("spotify:track:{:022}", index)
}

fn saved_track(index: usize) -> Value {
    json!({
        "added_at": "2024-01-01T00:00:00Z",
        "track": {
            "id": format!("{:022}", index),
            "name": format!("Song {}", index),
            "artists": [{ "id": "artist-1", "name": "Artist" }],
            "album": { "images": [{ "url": format!("https://i.scdn.co/image/{}", index) }] },
            "uri": track_uri(index),
        }
    })
}

// =============================================================================
// Token endpoint fake
// =============================================================================

pub struct FakeTokenEndpoint {
    refresh_token: Option<String>,
    /// `expires_in` of every refreshed access token
    refresh_lifetime: i64,
    pub exchanges: AtomicUsize,
    pub refreshes: AtomicUsize,
}

impl FakeTokenEndpoint {
    pub fn new(refresh_token: Option<&str>) -> Self {
        Self {
            refresh_token: refresh_token.map(str::to_string),
            refresh_lifetime: 3600,
            exchanges: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn with_refresh_lifetime(mut self, seconds: i64) -> Self {
        self.refresh_lifetime = seconds;
        self
    }
}

#[async_trait]
impl TokenEndpoint for FakeTokenEndpoint {
    fn authorize_url(&self, state: &str) -> Result<String> {
        Ok(format!(
            "https://accounts.test/authorize?client_id=client-id&response_type=code&state={}",
            state
        ))
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenPair> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if code == "bad-code" {
            return Err(AppError::Auth("Invalid authorization code".to_string()));
        }
        Ok(token_pair(
            &format!("access-{}", code),
            self.refresh_token.as_deref(),
            3600,
        ))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenResponse {
            access_token: format!("refreshed-{}", n),
            token_type: Some("Bearer".to_string()),
            scope: None,
            expires_in: Some(self.refresh_lifetime),
            refresh_token: None,
        })
    }
}

// =============================================================================
// Web API fake
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertCall {
    pub playlist_id: String,
    pub position: usize,
    pub uris: Vec<String>,
}

/// Library of `liked` saved tracks, recording every call made against it.
#[derive(Default)]
pub struct FakeSpotify {
    pub liked: usize,
    /// Indexes of saved items whose track is null
    pub unavailable: Vec<usize>,
    /// 1-based insertion call that fails
    pub fail_insert_call: Option<usize>,
    /// 1-based liked-page request that fails
    pub fail_page_call: Option<usize>,
    pub fail_create: bool,
    /// Playlists whose unfollow is refused
    pub fail_unfollow: Vec<String>,
    /// Serve at most this many liked items per page, whatever the limit
    pub page_cap: Option<usize>,
    /// Raised by every insertion call, after the chunk is committed
    pub cancel_on_insert: Option<CancelFlag>,
    /// Raised by every liked-page request
    pub cancel_on_page: Option<CancelFlag>,
    /// When set, `current_user` waits for a notification first
    pub profile_gate: Option<Arc<Notify>>,

    pub page_offsets: Mutex<Vec<u32>>,
    pub inserts: Mutex<Vec<InsertCall>>,
    pub removals: Mutex<Vec<InsertCall>>,
    pub searches: Mutex<Vec<(String, String, u32, u32)>>,
    pub created: Mutex<Vec<(String, String, bool)>>,
    pub unfollowed: Mutex<Vec<String>>,
    pub tokens_seen: Mutex<Vec<String>>,
}

impl FakeSpotify {
    pub fn with_liked(liked: usize) -> Self {
        Self {
            liked,
            ..Default::default()
        }
    }

    pub fn page_offsets(&self) -> Vec<u32> {
        self.page_offsets.lock().unwrap().clone()
    }

    pub fn inserts(&self) -> Vec<InsertCall> {
        self.inserts.lock().unwrap().clone()
    }

    pub fn removals(&self) -> Vec<InsertCall> {
        self.removals.lock().unwrap().clone()
    }

    pub fn unfollowed(&self) -> Vec<String> {
        self.unfollowed.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<(String, String, bool)> {
        self.created.lock().unwrap().clone()
    }

    fn seen(&self, ctx: &AuthContext) {
        self.tokens_seen
            .lock()
            .unwrap()
            .push(ctx.access_token.clone());
    }
}

#[async_trait]
impl SpotifyApi for FakeSpotify {
    async fn current_user(&self, ctx: &AuthContext) -> Result<UserProfile> {
        self.seen(ctx);
        if let Some(gate) = &self.profile_gate {
            gate.notified().await;
        }
        Ok(serde_json::from_value(json!({
            "id": "user-1",
            "display_name": "Test User",
            "email": "test@example.com",
        }))
        .unwrap())
    }

    async fn saved_tracks(
        &self,
        ctx: &AuthContext,
        offset: u32,
        limit: u32,
    ) -> Result<Paging<SavedTrackObject>> {
        self.seen(ctx);
        let call = {
            let mut offsets = self.page_offsets.lock().unwrap();
            offsets.push(offset);
            offsets.len()
        };
        if self.fail_page_call == Some(call) {
            return Err(AppError::ExternalApi {
                status: 503,
                message: "Service unavailable".to_string(),
            });
        }
        if let Some(flag) = &self.cancel_on_page {
            flag.cancel();
        }

        let served = self.page_cap.map_or(limit as usize, |cap| cap.min(limit as usize));
        let start = (offset as usize).min(self.liked);
        let end = (offset as usize + served).min(self.liked);
        let items = (start..end)
            .map(|i| {
                if self.unavailable.contains(&i) {
                    serde_json::from_value(json!({ "added_at": null, "track": null })).unwrap()
                } else {
                    serde_json::from_value(saved_track(i)).unwrap()
                }
            })
            .collect();

        Ok(Paging {
            items,
            total: Some(self.liked as u32),
            limit: Some(limit),
            offset: Some(offset),
            next: (end < self.liked).then(|| format!("next?offset={}", end)),
        })
    }

    async fn user_playlists(
        &self,
        ctx: &AuthContext,
        _offset: u32,
        _limit: u32,
    ) -> Result<Paging<PlaylistObject>> {
        self.seen(ctx);
        let items = self
            .created()
            .into_iter()
            .enumerate()
            .map(|(i, (name, _, public))| {
                serde_json::from_value(json!({
                    "id": format!("pl-{}", i + 1),
                    "name": name,
                    "public": public,
                    "owner": { "id": "user-1" },
                    "tracks": { "total": 0 },
                }))
                .unwrap()
            })
            .collect::<Vec<_>>();
        let total = items.len() as u32;

        Ok(Paging {
            items,
            total: Some(total),
            limit: None,
            offset: None,
            next: None,
        })
    }

    async fn create_playlist(
        &self,
        ctx: &AuthContext,
        user_id: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<PlaylistObject> {
        self.seen(ctx);
        if self.fail_create {
            return Err(AppError::RateLimited {
                retry_after: Some(3),
            });
        }

        let id = {
            let mut created = self.created.lock().unwrap();
            created.push((name.to_string(), description.to_string(), public));
            format!("pl-{}", created.len())
        };

        Ok(serde_json::from_value(json!({
            "id": id,
            "name": name,
            "description": description,
            "public": public,
            "external_urls": { "spotify": format!("https://open.spotify.com/playlist/{}", id) },
            "owner": { "id": user_id },
        }))
        .unwrap())
    }

    async fn add_tracks(
        &self,
        ctx: &AuthContext,
        playlist_id: &str,
        uris: &[String],
        position: usize,
    ) -> Result<String> {
        self.seen(ctx);
        let call = {
            let mut inserts = self.inserts.lock().unwrap();
            inserts.push(InsertCall {
                playlist_id: playlist_id.to_string(),
                position,
                uris: uris.to_vec(),
            });
            inserts.len()
        };

        if self.fail_insert_call == Some(call) {
            return Err(AppError::ExternalApi {
                status: 500,
                message: "Internal server error".to_string(),
            });
        }
        if let Some(flag) = &self.cancel_on_insert {
            flag.cancel();
        }
        Ok(format!("snapshot-{}", call))
    }

    async fn remove_tracks(
        &self,
        ctx: &AuthContext,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<String> {
        self.seen(ctx);
        let call = {
            let mut removals = self.removals.lock().unwrap();
            removals.push(InsertCall {
                playlist_id: playlist_id.to_string(),
                position: 0,
                uris: uris.to_vec(),
            });
            removals.len()
        };
        Ok(format!("removed-{}", call))
    }

    async fn unfollow_playlist(&self, ctx: &AuthContext, playlist_id: &str) -> Result<()> {
        self.seen(ctx);
        if self.fail_unfollow.iter().any(|id| id == playlist_id) {
            return Err(AppError::ExternalApi {
                status: 403,
                message: "You cannot remove this playlist".to_string(),
            });
        }
        self.unfollowed
            .lock()
            .unwrap()
            .push(playlist_id.to_string());
        Ok(())
    }

    async fn search(
        &self,
        ctx: &AuthContext,
        query: &str,
        types: &str,
        limit: u32,
        offset: u32,
    ) -> Result<SearchResponse> {
        self.seen(ctx);
        self.searches.lock().unwrap().push((
            query.to_string(),
            types.to_string(),
            limit,
            offset,
        ));

        let body = match types {
            "artist" => json!({
                "artists": {
                    "items": [{ "id": "artist-1", "name": query }],
                    "total": 1,
                }
            }),
            _ => json!({
                "tracks": {
                    "items": (0..3).map(|i| saved_track(i)["track"].clone()).collect::<Vec<_>>(),
                    "total": 3,
                }
            }),
        };
        Ok(serde_json::from_value(body).unwrap())
    }
}

// =============================================================================
// App helpers
// =============================================================================

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    pub spotify: Arc<FakeSpotify>,
    pub oauth: Arc<FakeTokenEndpoint>,
}

impl TestApp {
    pub fn new(spotify: FakeSpotify) -> Self {
        Self::with_oauth(spotify, FakeTokenEndpoint::new(Some("refresh-1")))
    }

    pub fn with_oauth(spotify: FakeSpotify, oauth: FakeTokenEndpoint) -> Self {
        let spotify = Arc::new(spotify);
        let oauth = Arc::new(oauth);
        let state = Arc::new(AppState::new(
            test_config("https://accounts.test", "https://api.test/v1"),
            oauth.clone(),
            spotify.clone(),
        ));
        let router = sputilities::build_router(state.clone());

        Self {
            state,
            router,
            spotify,
            oauth,
        }
    }

    /// A signed-in session holding `access` and a refresh token.
    pub async fn session(&self, access: &str) -> (Uuid, String) {
        let id = self
            .state
            .sessions
            .create_session(token_pair(access, Some("refresh-1"), 3600))
            .await;
        let token = self.state.sessions.issue_token(id).unwrap();
        (id, token)
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        use tower::util::ServiceExt;
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Polls until the operation reaches a terminal status.
    pub async fn wait_for_terminal(&self, session_id: Uuid, id: Uuid) -> Operation {
        for _ in 0..500 {
            let operation = self.state.operations.get(session_id, id).await.unwrap();
            if operation.status.is_terminal() {
                return operation;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("operation {} never finished", id);
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn post_empty(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("response body should be JSON")
}

pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// =============================================================================
// Mock provider over HTTP
// =============================================================================

#[derive(Clone)]
struct MockState {
    liked: usize,
    issue_refresh_token: bool,
    token_requests: Arc<Mutex<Vec<HashMap<String, String>>>>,
    basic_auth: Arc<Mutex<Vec<String>>>,
    api_auth: Arc<Mutex<Vec<String>>>,
    liked_requests: Arc<Mutex<Vec<(u32, u32)>>>,
}

/// Accounts service and Web API on a local port. The accounts service lives
/// at the root and the Web API under `/v1`.
pub struct MockProvider {
    pub base_url: String,
    state: MockState,
}

impl MockProvider {
    pub async fn start(liked: usize, issue_refresh_token: bool) -> Self {
        let state = MockState {
            liked,
            issue_refresh_token,
            token_requests: Arc::default(),
            basic_auth: Arc::default(),
            api_auth: Arc::default(),
            liked_requests: Arc::default(),
        };

        let app = Router::new()
            .route("/api/token", post(mock_token))
            .route("/v1/me", route_get(mock_me))
            .route("/v1/me/tracks", route_get(mock_liked))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock provider should bind");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn config(&self) -> Config {
        test_config(&self.base_url, &format!("{}/v1", self.base_url))
    }

    /// Form bodies posted to the token endpoint
    pub fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.state.token_requests.lock().unwrap().clone()
    }

    pub fn basic_auth(&self) -> Vec<String> {
        self.state.basic_auth.lock().unwrap().clone()
    }

    /// Authorization headers seen on Web API calls
    pub fn api_auth(&self) -> Vec<String> {
        self.state.api_auth.lock().unwrap().clone()
    }

    pub fn liked_requests(&self) -> Vec<(u32, u32)> {
        self.state.liked_requests.lock().unwrap().clone()
    }
}

fn authorization(headers: &HeaderMap) -> String {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn mock_token(
    State(state): State<MockState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.basic_auth.lock().unwrap().push(authorization(&headers));
    state.token_requests.lock().unwrap().push(form.clone());

    let grant = form.get("grant_type").map(String::as_str);
    let access_token = match (grant, form.get("code").map(String::as_str)) {
        (Some("authorization_code"), Some("abc123")) => "T1",
        (Some("refresh_token"), _) => "T2",
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid_grant",
                    "error_description": "Invalid authorization code",
                })),
            )
                .into_response();
        }
    };

    let mut body = json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "scope": "user-library-read",
        "expires_in": 3600,
    });
    if state.issue_refresh_token && grant == Some("authorization_code") {
        body["refresh_token"] = json!("R1");
    }
    Json(body).into_response()
}

async fn mock_me(State(state): State<MockState>, headers: HeaderMap) -> Json<Value> {
    state.api_auth.lock().unwrap().push(authorization(&headers));
    Json(json!({
        "id": "user-1",
        "display_name": "Mock User",
        "email": "mock@example.com",
    }))
}

async fn mock_liked(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.api_auth.lock().unwrap().push(authorization(&headers));

    let offset: u32 = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit: u32 = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(20);
    state.liked_requests.lock().unwrap().push((offset, limit));

    let start = (offset as usize).min(state.liked);
    let end = (offset as usize + limit as usize).min(state.liked);
    let items: Vec<Value> = (start..end).map(saved_track).collect();

    Json(json!({
        "items": items,
        "total": state.liked,
        "limit": limit,
        "offset": offset,
        "next": (end < state.liked).then(|| format!("/v1/me/tracks?offset={}", end)),
    }))
}
