pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use api::AppState;
pub use config::Config;
pub use error::{AppError, Result};

use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// All relay routes under `/api/v1`.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(api::health_routes())
                .merge(api::auth_routes())
                .merge(api::library_routes())
                .merge(api::playlist_routes())
                .merge(api::operation_routes())
                .merge(api::dashboard_routes())
                .with_state(state),
        )
        .layer(TraceLayer::new_for_http())
}

/// Credentialed CORS for the configured origins; `*` allows any origin
/// without credentials.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if config.cors_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    base.allow_origin(origins).allow_credentials(true)
}
