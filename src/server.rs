//! HTTP transport
//!
//! `POST /judge` takes an encrypted request envelope and answers with an
//! encrypted response envelope. Failure policy:
//! - the envelope cannot be opened, or no usable response key can be
//!   recovered: `400` with an empty body
//! - any later failure: an encrypted `ErrorEnvelope` under the request key,
//!   with a status code matching the failure class

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::crypto;
use crate::error::JudgeError;
use crate::judge::JudgeEngine;
use crate::protocol::{ErrorEnvelope, JudgeRequest};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<JudgeEngine>,
    secret_key: Arc<str>,
}

impl AppState {
    pub fn new(engine: Arc<JudgeEngine>, secret_key: &str) -> Self {
        Self {
            engine,
            secret_key: Arc::from(secret_key),
        }
    }
}

pub fn router(state: AppState, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/judge", post(judge_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(settings: &Settings, engine: Arc<JudgeEngine>) -> anyhow::Result<()> {
    let state = AppState::new(engine, &settings.secret_key);
    let app = router(state, settings.max_request_bytes);

    let addr = settings.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn judge_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let plaintext = match crypto::decrypt(&body, state.secret_key.as_bytes()) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            warn!("Rejected request envelope: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let request = match JudgeRequest::from_slice(&plaintext) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected malformed request: {}", e);
            return match JudgeRequest::key_from_slice(&plaintext) {
                Some(key) => error_response(&key, &JudgeError::Protocol(e)),
                None => StatusCode::BAD_REQUEST.into_response(),
            };
        }
    };

    let key = request.key.clone();
    if let Err(e) = crypto::check_key(key.as_bytes()) {
        warn!("Rejected request with unusable response key: {}", e);
        return StatusCode::BAD_REQUEST.into_response();
    }

    match state.engine.judge(request).await {
        Ok(response) => encrypted_response(StatusCode::OK, &key, &response),
        Err(e) => {
            warn!("Judge request failed: {}", e);
            error_response(&key, &e)
        }
    }
}

fn status_for(err: &JudgeError) -> StatusCode {
    match err {
        JudgeError::Protocol(_) => StatusCode::BAD_REQUEST,
        JudgeError::UnsupportedLanguage(_) | JudgeError::Compile(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        JudgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(key: &str, err: &JudgeError) -> Response {
    let body = ErrorEnvelope {
        error: err.kind().to_string(),
        msg: err.to_string(),
    };
    encrypted_response(status_for(err), key, &body)
}

fn encrypted_response<T: Serialize>(status: StatusCode, key: &str, body: &T) -> Response {
    let json = match serde_json::to_vec(body) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match crypto::encrypt(&json, key.as_bytes()) {
        Ok(envelope) => (
            status,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            envelope,
        )
            .into_response(),
        Err(e) => {
            warn!("Failed to encrypt response: {}", e);
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}
