//! HTTP surface
//!
//! Routes:
//! - `GET /avatar`, `GET /api/avatar`: avatar proxy (always an image)
//! - `GET /api/leaderboard`: one page of the board
//! - `POST /api/submit-score`: record a run
//! - `GET /health`, `GET /metrics`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use super::metrics::{metrics_handler, STD_METRICS};
use crate::avatar::{avatar_response, AvatarResolver, Handle, SizeToken};
use crate::config::{Config, ConfigError};
use crate::leaderboard::{now_millis, Leaderboard, LeaderboardError, PageQuery, ScoreRecord};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Leaderboard(#[from] LeaderboardError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub resolver: Arc<AvatarResolver>,
    pub leaderboard: Leaderboard,
}

impl AppState {
    pub fn new(resolver: AvatarResolver, leaderboard: Leaderboard) -> Self {
        Self {
            resolver: Arc::new(resolver),
            leaderboard,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        Ok(Self::new(
            AvatarResolver::from_config(&config.avatar),
            Leaderboard::from_config(&config.leaderboard)?,
        ))
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/avatar", get(avatar_handler).fallback(method_not_allowed))
        .route("/api/avatar", get(avatar_handler).fallback(method_not_allowed))
        .route(
            "/api/leaderboard",
            get(leaderboard_handler).fallback(method_not_allowed),
        )
        .route(
            "/api/submit-score",
            post(submit_score_handler).fallback(method_not_allowed),
        )
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Bind and serve until ctrl-c / SIGTERM.
pub async fn serve(config: &Config) -> Result<(), ServerError> {
    let addr = config.server.socket_addr()?;
    let state = AppState::from_config(config)?;
    info!(
        address = %addr,
        sources = ?state.resolver.source_names(),
        leaderboard = state.leaderboard.backend(),
        namespace = state.leaderboard.namespace(),
        "starting server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

/// Decoded query pairs; the first occurrence of a key wins.
fn query_param(raw: Option<&str>, key: &str) -> Option<String> {
    url::form_urlencoded::parse(raw.unwrap_or_default().as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

async fn avatar_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let raw_handle = query_param(query.as_deref(), "handle").unwrap_or_default();
    let handle = Handle::normalize(&raw_handle);
    let size = SizeToken::parse_or_default(query_param(query.as_deref(), "size").as_deref());

    let image = state.resolver.resolve(&handle, size).await;
    let response = avatar_response(&image, &headers);
    STD_METRICS
        .avatar_responses_total
        .inc(&[image.tier.as_str(), response.status().as_str()]);
    response
}

async fn leaderboard_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Response {
    let raw = query.as_deref();
    let page_query = PageQuery::from_raw(
        query_param(raw, "start").as_deref(),
        query_param(raw, "count").as_deref(),
        query_param(raw, "rankFor").as_deref(),
    );

    match state.leaderboard.page(&page_query).await {
        Ok(page) => {
            STD_METRICS.leaderboard_reads_total.inc(&["ok"]);
            Json(page).into_response()
        }
        Err(e) => {
            STD_METRICS.leaderboard_reads_total.inc(&["error"]);
            e.into_response()
        }
    }
}

async fn submit_score_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let record = match ScoreRecord::from_json(&body, now_millis()) {
        Ok(record) => record,
        Err(e) => {
            STD_METRICS.leaderboard_submissions_total.inc(&["invalid"]);
            return e.into_response();
        }
    };

    match state.leaderboard.submit(&record).await {
        Ok(outcome) => {
            let label = if outcome.updated { "updated" } else { "unchanged" };
            STD_METRICS.leaderboard_submissions_total.inc(&[label]);
            Json(outcome).into_response()
        }
        Err(e) => {
            STD_METRICS.leaderboard_submissions_total.inc(&["error"]);
            e.into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "leaderboard": state.leaderboard.backend(),
        "sources": state.resolver.source_names(),
    }))
}

async fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response()
}

impl IntoResponse for LeaderboardError {
    fn into_response(self) -> Response {
        let status = match self {
            LeaderboardError::InvalidPayload => StatusCode::BAD_REQUEST,
            LeaderboardError::Connection(_) | LeaderboardError::Store(_) => {
                error!(error = %self, "leaderboard store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
