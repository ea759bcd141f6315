//! # Hook Relay HTTP Service
//!
//! HTTP server that receives GitHub and Feishu webhooks and relays push
//! notifications into Feishu chats.
//!
//! This service provides:
//! - GitHub webhook endpoint (`push` and `ping`)
//! - Feishu event callback endpoint (URL verification, bot added/removed)
//! - Routing configuration, liveness, health and metrics endpoints

pub mod config;
pub mod errors;
pub mod metrics;
pub mod responses;

pub use config::{FeishuSettings, LoggingConfig, ServerConfig, ServiceConfig};
pub use errors::{ConfigError, ServiceError, WebhookHandlerError};
pub use metrics::ServiceMetrics;
pub use responses::*;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use hook_relay_core::{
    build_card,
    feishu::{
        lenient_challenge, verification_challenge, FeishuEventPayload, BOT_ADDED_EVENT,
        BOT_REMOVED_EVENT,
    },
    github::{EVENT_HEADER, PING_EVENT, PUSH_EVENT},
    resolve_chat_id, ConfigStore, NotificationSender, PushEvent,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Name reported by the liveness endpoint.
pub const SERVICE_NAME: &str = "hook-relay";

/// Header used to correlate a request across log lines.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Relay configuration file: credentials and chat routing
    pub store: Arc<ConfigStore>,

    /// Delivers notification cards to Feishu
    pub sender: Arc<dyn NotificationSender>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        store: Arc<ConfigStore>,
        sender: Arc<dyn NotificationSender>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            config,
            store,
            sender,
            metrics,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route("/webhook/github", post(handle_github_webhook))
        .route("/webhook/feishu_events", post(handle_feishu_event));

    let config_routes = Router::new().route("/config/project-mapping", get(get_project_mapping));

    let status_routes = Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health_check))
        .route("/metrics", get(metrics_endpoint));

    let body_limit = state.config.server.max_body_size;

    Router::new()
        .merge(webhook_routes)
        .merge(config_routes)
        .merge(status_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .layer(DefaultBodyLimit::max(body_limit))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server
///
/// Serves until SIGINT or SIGTERM, then lets in-flight requests finish.
pub async fn start_server(
    config: ServiceConfig,
    store: Arc<ConfigStore>,
    sender: Arc<dyn NotificationSender>,
) -> Result<(), ServiceError> {
    let metrics = ServiceMetrics::new().map_err(|e| {
        ServiceError::Configuration(ConfigError::Invalid {
            message: format!("Failed to initialize metrics: {}", e),
        })
    })?;

    let address = config.bind_address();
    let shutdown_timeout = std::time::Duration::from_secs(config.server.shutdown_timeout_seconds);

    let app = create_router(AppState::new(config, store, sender, metrics));

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!(address = %address, "Relay listening");

    let shutdown_signal = async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C signal handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!(timeout_seconds = shutdown_timeout.as_secs(), "SIGINT received, draining requests"),
            _ = terminate => info!(timeout_seconds = shutdown_timeout.as_secs(), "SIGTERM received, draining requests"),
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server stopped");
    Ok(())
}

// ============================================================================
// GitHub Webhook Handler
// ============================================================================

/// Handle GitHub webhook deliveries
///
/// Credentials are checked before the body is read so a misconfigured relay
/// fails loudly on every delivery. `ping` is acknowledged, `push` is relayed,
/// every other event type is ignored.
#[instrument(skip(state, headers, body), fields(event_type))]
pub async fn handle_github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StatusResponse>, WebhookHandlerError> {
    state.metrics.record_webhook("github");

    let event_type = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    tracing::Span::current().record("event_type", event_type.as_str());
    info!("Received GitHub webhook");

    if !state.store.credentials_configured() {
        return Err(WebhookHandlerError::CredentialsNotConfigured);
    }

    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| WebhookHandlerError::InvalidPayload {
            message: e.to_string(),
        })?;

    match event_type.as_str() {
        PING_EVENT => {
            info!("GitHub ping received");
            Ok(Json(StatusResponse::success(
                "Ping event received successfully",
            )))
        }
        PUSH_EVENT => {
            let push: PushEvent = serde_json::from_value(payload).map_err(|e| {
                WebhookHandlerError::InvalidPayload {
                    message: e.to_string(),
                }
            })?;
            relay_push(&state, &push).await.map(Json)
        }
        "" => {
            info!("GitHub webhook without event type ignored");
            Ok(Json(StatusResponse::ignored(
                "Missing X-GitHub-Event header; nothing to do",
            )))
        }
        other => {
            info!(event_type = %other, "GitHub event type not handled");
            Ok(Json(StatusResponse::ignored(format!(
                "Event type '{}' ignored",
                other
            ))))
        }
    }
}

/// Route, format and send one push notification.
async fn relay_push(
    state: &AppState,
    push: &PushEvent,
) -> Result<StatusResponse, WebhookHandlerError> {
    let repository = push.repository_name();
    let chat_id = resolve_chat_id(
        repository,
        &state.store.project_chat_mapping(),
        &state.store.current_chat_id(),
    );

    if chat_id.is_empty() {
        return Err(WebhookHandlerError::NoTargetChat {
            repository: repository.to_string(),
        });
    }

    let card = build_card(push);

    match state.sender.send_card(&chat_id, &card).await {
        Ok(()) => {
            state.metrics.record_delivery(true);
            info!(
                repository = %repository,
                chat_id = %chat_id,
                commits = push.commits.len(),
                "Push notification relayed"
            );
            Ok(StatusResponse::success("Notification sent to Feishu").with_chat_id(chat_id))
        }
        Err(e) => {
            state.metrics.record_delivery(false);
            error!(
                repository = %repository,
                chat_id = %chat_id,
                error = %e,
                "Push notification could not be relayed"
            );
            Err(WebhookHandlerError::DeliveryFailed(e))
        }
    }
}

// ============================================================================
// Feishu Event Handler
// ============================================================================

/// Handle Feishu event callbacks
#[instrument(skip(state, body))]
pub async fn handle_feishu_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<FeishuEventResponse>, WebhookHandlerError> {
    state.metrics.record_webhook("feishu");

    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            if let Some(challenge) = lenient_challenge(&body) {
                info!("URL verification recovered from malformed body");
                return Ok(Json(FeishuEventResponse::Challenge(ChallengeResponse {
                    challenge,
                })));
            }
            return Err(WebhookHandlerError::InvalidPayload {
                message: e.to_string(),
            });
        }
    };

    if let Some(challenge) = verification_challenge(&value) {
        info!("Feishu URL verification received");
        return Ok(Json(FeishuEventResponse::Challenge(ChallengeResponse {
            challenge,
        })));
    }

    let payload: FeishuEventPayload =
        serde_json::from_value(value).map_err(|e| WebhookHandlerError::InvalidPayload {
            message: e.to_string(),
        })?;

    let response = match payload.event_type() {
        Some(BOT_ADDED_EVENT) => handle_bot_added(&state, payload.chat_id()).await?,
        Some(BOT_REMOVED_EVENT) => handle_bot_removed(&state, payload.chat_id()).await?,
        other => {
            info!(event_type = other.unwrap_or("none"), "Feishu event type not handled");
            StatusResponse::ignored("Event type not handled by this endpoint.")
        }
    };

    Ok(Json(response.into()))
}

async fn handle_bot_added(
    state: &AppState,
    chat_id: Option<&str>,
) -> Result<StatusResponse, WebhookHandlerError> {
    let Some(chat_id) = chat_id else {
        warn!(event_type = BOT_ADDED_EVENT, "Bot added event without chat id");
        return Ok(StatusResponse::warning("Chat ID missing in event."));
    };

    info!(chat_id = %chat_id, "Bot added to chat");
    state.store.save_current_chat_id(chat_id).await?;
    state.metrics.record_chat_change("added");

    Ok(
        StatusResponse::success(format!("Current chat set to {} and saved.", chat_id))
            .with_chat_id(chat_id),
    )
}

/// Revert to the default chat when the bot leaves the current one.
async fn handle_bot_removed(
    state: &AppState,
    chat_id: Option<&str>,
) -> Result<StatusResponse, WebhookHandlerError> {
    let Some(removed) = chat_id else {
        warn!(event_type = BOT_REMOVED_EVENT, "Bot removed event without chat id");
        return Ok(StatusResponse::warning("Chat ID missing in event."));
    };

    let current = state.store.current_chat_id();
    if removed != current {
        info!(removed = %removed, current = %current, "Bot removed from a non-current chat");
        return Ok(StatusResponse::ignored(
            "Removed chat is not the current chat; nothing changed.",
        ));
    }

    let Some(default_chat_id) = state.store.default_chat_id_from_file().await else {
        warn!(removed = %removed, "No default chat id available to fall back to");
        return Ok(StatusResponse::warning(
            "Bot removed from current chat but no default chat id is available.",
        ));
    };

    info!(removed = %removed, default_chat_id = %default_chat_id, "Reverting to default chat");
    state.store.save_current_chat_id(&default_chat_id).await?;
    state.metrics.record_chat_change("removed");

    Ok(StatusResponse::success(format!(
        "Bot removed from current chat; reverted to default chat {}.",
        default_chat_id
    ))
    .with_chat_id(default_chat_id))
}

// ============================================================================
// Status Handlers
// ============================================================================

/// Current repository to chat routing
#[instrument(skip_all)]
async fn get_project_mapping(State(state): State<AppState>) -> Json<ProjectMappingResponse> {
    let config = state.store.snapshot();
    let configured = !config.project_chat_mapping.is_empty();

    Json(ProjectMappingResponse {
        status: if configured { "ok" } else { "not_configured" }.to_string(),
        mapping: config.project_chat_mapping,
        default_chat_id: config.default_chat_id,
        current_chat_id: config.current_chat_id,
        message: (!configured).then(|| {
            "No project chat mapping configured; all notifications go to the current chat."
                .to_string()
        }),
    })
}

async fn handle_root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        status: "running".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        config_loaded: true,
        credentials_configured: state.store.credentials_configured(),
    })
}

async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.render().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

// ============================================================================
// Middleware
// ============================================================================

/// Attach a correlation id to every request and log its outcome.
///
/// An incoming `x-correlation-id` is reused; otherwise a UUID v4 is minted.
/// The id is stored in request extensions and echoed on the response.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let started = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    info!("Request started");

    let mut response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if let Ok(value) = correlation_id.parse() {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    let status = response.status();
    if status.is_server_error() {
        error!(status = status.as_u16(), elapsed_ms, "Request failed");
    } else if status.is_client_error() {
        warn!(status = status.as_u16(), elapsed_ms, "Request rejected");
    } else {
        info!(status = status.as_u16(), elapsed_ms, "Request completed");
    }

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
