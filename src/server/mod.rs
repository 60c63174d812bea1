// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP surface of the relay

use crate::config::{Config, ServerConfig};
use crate::http::certs::{CertificateLoader, CertificateStore};
use crate::http::{ClientCache, HttpByteResponse, HttpResponse, Relay, RelayError, RequestOptions};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Nginx-style "client closed request", used for caller cancellation.
const CLIENT_CLOSED_REQUEST: u16 = 499;

const CORS_ALLOW_HEADERS: &str = "Content-Type, X-CSRF-Token, X-Requested-With, Accept, Accept-Version, Content-Length, Content-MD5, Date, X-Api-Version, X-File-Name";
const CORS_ALLOW_METHODS: &str = "POST,GET,PUT,PATCH,DELETE,OPTIONS";

pub struct AppState {
    pub relay: Relay,
    /// Cancelled on shutdown; every relayed call runs under a child token.
    pub shutdown: CancellationToken,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(relay: Relay) -> Self {
        Self {
            relay,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let store = CertificateStore::open(config.certificate_store_dir());
        let cache = ClientCache::new(CertificateLoader::new(store), config.idle_ttl());
        Self::new(Relay::new(cache))
    }
}

/// Uniform error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub message: String,
}

pub fn app(state: SharedState, config: &ServerConfig) -> Router {
    let router = Router::new()
        .route("/api/HttpRequest", post(http_request))
        .route("/api/HttpRequestBytes", post(http_request_bytes))
        .route("/api/ClearClientCache", post(clear_client_cache))
        .route("/api/healthcheck", get(health_check))
        .layer(DefaultBodyLimit::max(config.max_request_bytes))
        .with_state(state);

    if config.cors {
        router.layer(middleware::from_fn(cors_headers))
    } else {
        router
    }
}

pub async fn run(listener: TcpListener, state: SharedState, config: &ServerConfig) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "relay listening");
    }
    axum::serve(listener, app(state, config))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn http_request(
    State(state): State<SharedState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    match relay_text(&state, &body).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(err),
    }
}

async fn http_request_bytes(
    State(state): State<SharedState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    match relay_bytes(&state, &body).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(err),
    }
}

async fn clear_client_cache(State(state): State<SharedState>) -> StatusCode {
    let evicted = state.relay.clear_client_cache();
    info!(evicted, "client cache cleared");
    StatusCode::NO_CONTENT
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn relay_text(state: &AppState, body: &[u8]) -> Result<HttpResponse, RelayError> {
    let options = parse_options(body)?;
    let cancel = state.shutdown.child_token();
    state.relay.send_text(&options, &cancel).await
}

async fn relay_bytes(state: &AppState, body: &[u8]) -> Result<HttpByteResponse, RelayError> {
    let options = parse_options(body)?;
    let cancel = state.shutdown.child_token();
    state.relay.send_bytes(&options, &cancel).await
}

fn parse_options(body: &[u8]) -> Result<RequestOptions, RelayError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| RelayError::Validation(format!("Invalid request options: {}", e)))?;
    RequestOptions::from_json(value)
}

fn error_response(err: RelayError) -> Response {
    let status = if err.is_cancellation() {
        StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST)
    } else {
        StatusCode::BAD_REQUEST
    };
    debug!(%status, error = %err, "request failed");

    (
        status,
        Json(ErrorEnvelope {
            message: err.to_string(),
        }),
    )
        .into_response()
}

/// A body that could not be read, too large included, gets the usual envelope.
fn rejection_response(rejection: BytesRejection) -> Response {
    debug!(status = %rejection.status(), "request body rejected");
    error_response(RelayError::Validation(rejection.body_text()))
}

async fn cors_headers(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    response
}
