//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use hook_relay_core::{ConfigStoreError, FeishuError};
use tracing::{error, warn};

/// Webhook handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: the body could not be decoded
/// - `500 Internal Server Error`: missing credentials, a failed config write or
///   a failed delivery to Feishu
///
/// The sender is never asked to retry; deliveries are best effort.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// Body is not valid JSON or not the expected shape
    #[error("Invalid JSON payload: {message}")]
    InvalidPayload { message: String },

    /// App id or secret is empty or still a placeholder
    #[error("Feishu app id or app secret is not configured")]
    CredentialsNotConfigured,

    /// Routing resolved to an empty chat id
    #[error("No target chat configured for repository {repository}")]
    NoTargetChat { repository: String },

    /// Writing the relay configuration file failed
    #[error("Failed to persist chat configuration: {0}")]
    ConfigPersistence(#[from] ConfigStoreError),

    /// Token refresh or message send failed
    #[error("Failed to deliver notification to Feishu: {0}")]
    DeliveryFailed(#[from] FeishuError),
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidPayload { message } => {
                warn!(error = %message, "Rejected webhook payload");
                StatusCode::BAD_REQUEST
            }
            Self::CredentialsNotConfigured => {
                error!("Feishu credentials missing or placeholder values");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NoTargetChat { repository } => {
                error!(repository = %repository, "No chat id resolved");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ConfigPersistence(e) => {
                error!(error = %e, "Chat configuration write failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::DeliveryFailed(e) => {
                error!(error = %e, transient = e.is_transient(), "Notification delivery failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl ServiceError {
    /// Process exit code reported for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Relay configuration file could not be loaded: {0}")]
    RelayConfig(#[from] ConfigStoreError),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
