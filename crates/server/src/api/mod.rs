use crate::config::{AppState, ServerConfig};
use anyhow::Result;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stepwise_core::EngineError;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod handlers;

/// Start the API server
pub async fn serve(addr: &str, config: ServerConfig) -> Result<()> {
    let state = AppState::new(&config)?;

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route(
            "/api/workflows",
            get(handlers::list_workflows).post(handlers::create_workflow),
        )
        .route(
            "/api/workflows/{workflow_id}",
            get(handlers::get_workflow)
                .patch(handlers::update_workflow)
                .delete(handlers::delete_workflow),
        )
        .route("/api/workflows/{workflow_id}/steps", post(handlers::add_step))
        .route(
            "/api/workflows/{workflow_id}/steps/{step_id}",
            patch(handlers::update_step).delete(handlers::delete_step),
        )
        .route("/api/workflows/{workflow_id}/run", post(handlers::start_run))
        .route("/api/workflows/{workflow_id}/runs", get(handlers::list_runs))
        .route("/api/runs/{run_id}", get(handlers::get_run))
        .route("/api/runs/{run_id}/logs", get(handlers::get_run_logs))
        .route(
            "/api/runs/{run_id}/steps/{step_run_id}/logs",
            get(handlers::get_step_run_logs),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "stepwise",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Malformed request that never reached the engine
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("invalid {kind} id: {value}")]
    InvalidId { kind: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Custom error type for API handlers
pub struct ApiError(anyhow::Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        if let Some(err) = self.0.downcast_ref::<EngineError>() {
            return match err {
                EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
                EngineError::Infrastructure(_) | EngineError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
        }
        if self.0.downcast_ref::<RequestError>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_msg = self.0.to_string();
        let details = self.0.chain().skip(1).map(|e| e.to_string()).collect::<Vec<_>>().join(": ");

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %error_msg, "Request failed");
        }

        let response = if details.is_empty() {
            ErrorResponse::new(error_msg)
        } else {
            ErrorResponse::with_details(error_msg, details)
        };

        (status, Json(response)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
