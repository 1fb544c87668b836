pub mod auth;
pub mod dashboard;
pub mod library;
pub mod middleware;
pub mod operations;
pub mod playlists;

pub use auth::auth_routes;
pub use dashboard::dashboard_routes;
pub use library::library_routes;
pub use operations::operation_routes;
pub use playlists::playlist_routes;

use crate::config::Config;
use crate::services::{
    OperationManager, Pipeline, SessionService, SpotifyApi, SpotifyClient, SpotifyOAuth,
    TokenEndpoint,
};
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionService>,
    pub spotify: Arc<dyn SpotifyApi>,
    pub pipeline: Arc<Pipeline>,
    pub operations: Arc<OperationManager>,
}

impl AppState {
    pub fn new(
        config: Config,
        oauth: Arc<dyn TokenEndpoint>,
        spotify: Arc<dyn SpotifyApi>,
    ) -> Self {
        let sessions = Arc::new(SessionService::new(oauth, &config));
        let pipeline = Arc::new(Pipeline::new(sessions.clone(), spotify.clone()));
        let operations = Arc::new(OperationManager::new(pipeline.clone()));

        Self {
            config: Arc::new(config),
            sessions,
            spotify,
            pipeline,
            operations,
        }
    }

    /// Wires the real provider clients over one shared HTTP client.
    pub fn from_config(config: Config) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("sputilities/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let oauth = Arc::new(SpotifyOAuth::new(&config, http.clone()));
        let spotify = Arc::new(SpotifyClient::new(config.spotify_api_url.clone(), http));

        Ok(Self::new(config, oauth, spotify))
    }
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
}

async fn home() -> &'static str {
    "hello-world"
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sputilities",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
