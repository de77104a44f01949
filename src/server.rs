//! HTTP surface
//!
//! - `POST /create-personal-sub`: store links, return subscription URLs
//! - `GET  /sub/{format}/{uuid}`: render a stored subscription
//! - `POST /ping`: probe one server
//! - `GET  /health`

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use crate::filter::AllowList;
use crate::parser::parse_descriptor;
use crate::probe::{Probe, ProbeOutcome, ProbeTarget, TcpProbe};
use crate::service::{CreateRequest, CreateResponse, OutputFormat, ServiceError, SubscriptionService};
use crate::settings::{Settings, StoreKind};
use crate::store::{FileStore, KvStore, MemoryStore};

// ============================================================================
// Errors
// ============================================================================

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// On create, an empty result is the caller's fault
    fn from_create(err: ServiceError) -> Self {
        match err {
            ServiceError::EmptyResult | ServiceError::InvalidRequest(_) => {
                Self::bad_request(err.to_string())
            }
            ServiceError::NotFound => Self::not_found(err.to_string()),
            ServiceError::Store(_) | ServiceError::Render(_) => Self::internal(err.to_string()),
        }
    }

    /// On fetch, an empty result means the stored links no longer render
    fn from_fetch(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound => Self::not_found("subscription"),
            ServiceError::InvalidRequest(_) => Self::bad_request(err.to_string()),
            ServiceError::EmptyResult | ServiceError::Store(_) | ServiceError::Render(_) => {
                Self::internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            error!("{}", self);
        }

        let body = Json(json!({
            "error": self.to_string(),
            "code": status_code.as_u16()
        }));

        (status_code, body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SubscriptionService>,
    pub probe: Arc<dyn Probe>,
}

impl AppState {
    /// Wires the store, service and probe described by the settings
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let store: Arc<dyn KvStore> = match settings.store {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::File => {
                let dir = settings.store_dir_expanded();
                info!("Using file store at {}", dir.display());
                Arc::new(FileStore::new(dir))
            }
        };

        let service = SubscriptionService::new(
            store,
            AllowList::default(),
            settings.ttl(),
            settings.base_url(),
        );
        let probe = TcpProbe::new(settings.probe_timeout())?;

        Ok(Self {
            service: Arc::new(service),
            probe: Arc::new(probe),
        })
    }
}

pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/create-personal-sub", post(create_subscription))
        .route("/sub/{format}/{uuid}", get(get_subscription))
        .route("/ping", post(ping))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

/// Serves until the listener fails
pub async fn serve(listener: TcpListener, app: Router) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

async fn create_subscription(
    State(state): State<AppState>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> ApiResult<Json<CreateResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let response = state
        .service
        .create(request)
        .await
        .map_err(ApiError::from_create)?;
    Ok(Json(response))
}

async fn get_subscription(
    State(state): State<AppState>,
    Path((format, uuid)): Path<(String, String)>,
) -> ApiResult<Response> {
    let format: OutputFormat = format
        .parse()
        .map_err(|_| ApiError::not_found(format!("format '{}'", format)))?;

    let document = state
        .service
        .fetch(format, &uuid)
        .await
        .map_err(ApiError::from_fetch)?;

    Ok(([(header::CONTENT_TYPE, document.content_type)], document.body).into_response())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PingRequest {
    Config { config: String },
    Target(ProbeTarget),
}

async fn ping(
    State(state): State<AppState>,
    payload: Result<Json<PingRequest>, JsonRejection>,
) -> ApiResult<Json<ProbeOutcome>> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let target = match request {
        PingRequest::Target(target) => target,
        PingRequest::Config { config } => {
            let descriptor = match parse_descriptor(&config) {
                Ok(descriptor) => descriptor,
                Err(e) => return Ok(Json(ProbeOutcome::failed(e.to_string()))),
            };
            match ProbeTarget::from_descriptor(&descriptor) {
                Some(target) => target,
                None => {
                    return Ok(Json(ProbeOutcome::failed(format!(
                        "{} runs over QUIC and cannot be probed over TCP",
                        descriptor.protocol()
                    ))));
                }
            }
        }
    };

    Ok(Json(state.probe.probe(&target).await))
}
