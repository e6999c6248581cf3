//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::MatchView;
use crate::matchmaking::ServiceError;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/matches/:match_id", get(match_handler))
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    players_in_queue: usize,
    connections: usize,
}

async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let health = state.matchmaking.health().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: health.active_matches,
        players_in_queue: health.players_in_queue,
        connections: health.connections,
    }))
}

// ============================================================================
// Match lookup
// ============================================================================

async fn match_handler(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<MatchView>, AppError> {
    // Anything that is not a UUID cannot name a match
    let match_id: Uuid = match_id
        .parse()
        .map_err(|_| AppError::NotFound("Match not found".to_string()))?;

    state
        .matchmaking
        .get_match(match_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Match not found".to_string()))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(#[from] ServiceError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unavailable(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Limits, MatchSettings};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            client_origin: "http://localhost:3000".to_string(),
            match_settings: MatchSettings::default(),
            limits: Limits::default(),
        };
        let (state, service) = AppState::new(config);
        tokio::spawn(service.run());
        state
    }

    async fn get_status(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_ok() {
        let router = build_router(test_state());
        assert_eq!(get_status(router, "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_match_is_404() {
        let router = build_router(test_state());
        let uri = format!("/matches/{}", Uuid::new_v4());
        assert_eq!(get_status(router, &uri).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_non_uuid_match_is_404() {
        let router = build_router(test_state());
        assert_eq!(
            get_status(router, "/matches/match_123_abc").await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_stopped_service_is_503() {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            client_origin: "http://localhost:3000".to_string(),
            match_settings: MatchSettings::default(),
            limits: Limits::default(),
        };
        let (state, service) = AppState::new(config);
        drop(service);

        let router = build_router(state);
        assert_eq!(
            get_status(router, "/health").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
