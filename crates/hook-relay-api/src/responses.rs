//! Response bodies returned by the HTTP endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Outcome of a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    Warning,
    Ignored,
}

/// Generic webhook acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusResponse {
    pub status: DeliveryStatus,
    pub message: String,

    /// Chat the notification went to, or the newly selected chat
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

impl StatusResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(DeliveryStatus::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DeliveryStatus::Warning, message)
    }

    pub fn ignored(message: impl Into<String>) -> Self {
        Self::new(DeliveryStatus::Ignored, message)
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    fn new(status: DeliveryStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            chat_id: None,
        }
    }
}

/// Answer to the Feishu URL verification handshake
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChallengeResponse {
    pub challenge: Value,
}

/// Body of `POST /webhook/feishu_events`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeishuEventResponse {
    Challenge(ChallengeResponse),
    Status(StatusResponse),
}

impl From<StatusResponse> for FeishuEventResponse {
    fn from(response: StatusResponse) -> Self {
        Self::Status(response)
    }
}

/// Liveness response for `GET /`
#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub config_loaded: bool,
    pub credentials_configured: bool,
}

/// Routing configuration for `GET /config/project-mapping`
#[derive(Debug, Serialize)]
pub struct ProjectMappingResponse {
    /// `ok`, or `not_configured` when the mapping is empty
    pub status: String,
    pub mapping: BTreeMap<String, String>,
    pub default_chat_id: String,
    pub current_chat_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}
