//! HTTP server module.
//!
//! This module exposes buddy matching over a small JSON API. It handles incoming
//! requests, coordinates with the match engine, and formats responses.
//!
//! | Method | Path              | Success                 | Failure                    |
//! |--------|-------------------|-------------------------|----------------------------|
//! | POST   | `/api/book_buddy` | 200, array of buddies   | 404 no match, 422/400 body |
//! | GET    | `/api/health`     | 200, status and counts  | 500 storage failure        |

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::models::{BuddyRequest, MatchStrength, ScoredBuddy};
use crate::query::{MatchEngine, MatchQuery, QueryError};

/// Errors that can occur while serving requests.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The request body was rejected before reaching the engine
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    /// No buddy matched the request
    #[error("{0}")]
    NotFound(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Matching failed
    #[error("Search failed: {0}")]
    SearchError(String),

    /// Server could not start
    #[error("Initialization error: {0}")]
    InitializationError(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Rejected { status, .. } => *status,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::SearchError(_) | ServerError::InitializationError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn error_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::BAD_REQUEST => "BAD_REQUEST",
        StatusCode::UNPROCESSABLE_ENTITY => "UNPROCESSABLE_ENTITY",
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "UNSUPPORTED_MEDIA_TYPE",
        _ => "INTERNAL_ERROR",
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = json!({
            "error": self.to_string(),
            "code": error_code(status),
        });
        (status, Json(body)).into_response()
    }
}

impl From<QueryError> for ServerError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NoMatches(_) => {
                ServerError::NotFound("No matching buddies found".to_string())
            }
            QueryError::InvalidQuery(message) => ServerError::InvalidRequest(message),
            QueryError::StorageError(message) => ServerError::SearchError(message),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

/// Data transfer object for a single matched buddy.
///
/// Flattens [`ScoredBuddy`] into the shape clients consume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuddyDto {
    pub id: Option<i64>,
    pub name: String,
    pub destination: Option<String>,
    pub language: Option<String>,
    pub local_language: Option<String>,
    pub keywords: Option<String>,
    pub event: Option<String>,
    pub package: Option<String>,

    /// Weighted match score (higher is better)
    pub score: u32,

    pub strength: MatchStrength,
}

impl From<ScoredBuddy> for BuddyDto {
    fn from(result: ScoredBuddy) -> Self {
        let profile = result.profile;
        Self {
            id: profile.id,
            name: profile.name,
            destination: profile.destination,
            language: profile.language,
            local_language: profile.local_language,
            keywords: profile.keywords,
            event: profile.event,
            package: profile.package,
            score: result.score,
            strength: result.strength,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,

    /// Server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn MatchEngine>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/book_buddy", post(book_buddy))
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn book_buddy(
    State(state): State<AppState>,
    payload: Result<Json<BuddyRequest>, JsonRejection>,
) -> ServerResult<Json<Vec<BuddyDto>>> {
    let Json(request) = payload?;
    let results = state
        .engine
        .find_best_buddies(&MatchQuery::new(request, None))
        .await?;
    Ok(Json(results.into_iter().map(BuddyDto::from).collect()))
}

async fn health(State(state): State<AppState>) -> ServerResult<Json<serde_json::Value>> {
    let profiles = state.engine.candidate_count().await?;
    Ok(Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "profiles": profiles,
    })))
}

/// HTTP server instance.
pub struct BuddyServer {
    config: ServerConfig,
    state: AppState,
}

impl BuddyServer {
    /// Create a new server instance.
    ///
    /// # Arguments
    /// * `config` - Network settings
    /// * `engine` - Engine answering match requests
    pub fn new(config: ServerConfig, engine: Arc<dyn MatchEngine>) -> Self {
        Self {
            config,
            state: AppState { engine },
        }
    }

    /// Bind and serve until Ctrl-C.
    ///
    /// # Errors
    /// Returns `ServerError::InitializationError` if the address cannot be bound
    /// or the server stops with an I/O error
    pub async fn run(self) -> ServerResult<()> {
        let address = self.config.bind_address();
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| ServerError::InitializationError(format!("cannot bind {}: {}", address, e)))?;

        info!("Buddy matching API listening on http://{}", address);
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::InitializationError(e.to_string()))?;

        info!("Server shut down gracefully");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
