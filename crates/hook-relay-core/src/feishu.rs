//! # Feishu Open API
//!
//! Outbound client for the two Open API calls the relay makes (tenant token
//! issuance and interactive message send) plus the inbound event callback
//! payload types.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::formatter::NotificationCard;
use crate::token_cache::{IssuedToken, TokenIssuer, DEFAULT_EXPIRE_SECONDS};

/// Public Feishu Open API host.
pub const DEFAULT_API_BASE_URL: &str = "https://open.feishu.cn";

const TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";
const SEND_MESSAGE_PATH: &str = "/open-apis/im/v1/messages";
const INTERACTIVE_MSG_TYPE: &str = "interactive";

/// Callback `type` of the URL verification handshake.
pub const URL_VERIFICATION: &str = "url_verification";

/// Event type delivered when the bot joins a chat.
pub const BOT_ADDED_EVENT: &str = "im.chat.member.bot.added_v1";

/// Event type delivered when the bot is removed from a chat.
pub const BOT_REMOVED_EVENT: &str = "im.chat.member.bot.deleted_v1";

// ============================================================================
// Errors
// ============================================================================

/// Failures talking to the Feishu Open API.
#[derive(Debug, Error)]
pub enum FeishuError {
    #[error("Feishu API unreachable: {message}")]
    Network { message: String },

    #[error("Feishu API request timed out")]
    Timeout,

    #[error("Feishu API returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Token endpoint answered with a non-zero code.
    #[error("Tenant access token request rejected (code {code}): {message}")]
    AuthFailed { code: i64, message: String },

    /// Send endpoint answered with a non-zero code.
    #[error("Feishu API rejected the request (code {code}): {message}")]
    Api { code: i64, message: String },

    #[error("Unexpected Feishu API response: {message}")]
    InvalidResponse { message: String },

    #[error("Failed to serialize card: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to create HTTP client: {message}")]
    Client { message: String },
}

/// Send-endpoint codes meaning the tenant access token itself was refused.
pub const TOKEN_REJECTED_CODES: [i64; 2] = [99991661, 99991663];

impl FeishuError {
    /// Whether Feishu refused the bearer token, so a cached copy is useless.
    pub fn is_token_rejected(&self) -> bool {
        match self {
            Self::Api { code, .. } => TOKEN_REJECTED_CODES.contains(code),
            Self::HttpStatus { status, .. } => *status == 401,
            _ => false,
        }
    }

    /// Whether the same call may succeed if repeated later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Timeout => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::AuthFailed { .. } => false,
            Self::Api { .. } => false,
            Self::InvalidResponse { .. } => false,
            Self::Serialization(_) => false,
            Self::Client { .. } => false,
        }
    }
}

impl From<reqwest::Error> for FeishuError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network {
                message: e.to_string(),
            }
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Connection settings for the Open API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeishuApiConfig {
    /// Scheme and host without a trailing slash
    pub api_base_url: String,
    pub token_timeout: Duration,
    pub send_timeout: Duration,
}

impl Default for FeishuApiConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    app_id: &'a str,
    app_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default = "missing_code")]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: Option<String>,
    #[serde(default)]
    expire: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    receive_id: &'a str,
    msg_type: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    #[serde(default = "missing_code")]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    #[serde(default)]
    message_id: Option<String>,
}

fn missing_code() -> i64 {
    -1
}

/// HTTP client for the Feishu Open API bound to one app's credentials.
pub struct FeishuClient {
    http: reqwest::Client,
    config: FeishuApiConfig,
    app_id: String,
    app_secret: String,
}

impl FeishuClient {
    /// Create a client for the given app.
    ///
    /// # Errors
    /// Returns `FeishuError::Client` if the HTTP client cannot be built.
    pub fn new(
        config: FeishuApiConfig,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Result<Self, FeishuError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hook-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeishuError::Client {
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            config,
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        })
    }

    pub fn config(&self) -> &FeishuApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// Exchange the app credentials for a tenant access token.
    ///
    /// # Errors
    /// - `FeishuError::AuthFailed` - non-zero `code` in the response
    /// - `FeishuError::Network` / `FeishuError::Timeout` - transport failure
    /// - `FeishuError::HttpStatus` - non-2xx status without a parsable body
    #[instrument(skip(self))]
    pub async fn request_token(&self) -> Result<IssuedToken, FeishuError> {
        let response = self
            .http
            .post(self.url(TOKEN_PATH))
            .timeout(self.config.token_timeout)
            .json(&TokenRequest {
                app_id: &self.app_id,
                app_secret: &self.app_secret,
            })
            .send()
            .await?;

        let body: TokenResponse = parse_body(response).await?;
        if body.code != 0 {
            error!(code = body.code, msg = %body.msg, "Tenant access token request rejected");
            return Err(FeishuError::AuthFailed {
                code: body.code,
                message: body.msg,
            });
        }

        let token = body
            .tenant_access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FeishuError::InvalidResponse {
                message: "token response did not include tenant_access_token".to_string(),
            })?;

        Ok(IssuedToken {
            token,
            expires_in_seconds: body.expire.unwrap_or(DEFAULT_EXPIRE_SECONDS),
        })
    }

    /// Post an interactive card to a chat.
    ///
    /// Returns the provider's message id when it reports one.
    ///
    /// # Errors
    /// - `FeishuError::Api` - non-zero `code` in the response
    /// - `FeishuError::Network` / `FeishuError::Timeout` - transport failure
    #[instrument(skip(self, token, card))]
    pub async fn send_card(
        &self,
        token: &str,
        chat_id: &str,
        card: &NotificationCard,
    ) -> Result<Option<String>, FeishuError> {
        let request = SendMessageRequest {
            receive_id: chat_id,
            msg_type: INTERACTIVE_MSG_TYPE,
            content: card.to_content_string()?,
        };

        let response = self
            .http
            .post(self.url(SEND_MESSAGE_PATH))
            .query(&[("receive_id_type", "chat_id")])
            .bearer_auth(token)
            .timeout(self.config.send_timeout)
            .json(&request)
            .send()
            .await?;

        let body: SendMessageResponse = parse_body(response).await?;
        if body.code != 0 {
            error!(code = body.code, msg = %body.msg, "Feishu rejected message");
            return Err(FeishuError::Api {
                code: body.code,
                message: body.msg,
            });
        }

        Ok(body.data.and_then(|d| d.message_id))
    }
}

impl std::fmt::Debug for FeishuClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeishuClient")
            .field("config", &self.config)
            .field("app_id", &self.app_id)
            .field("app_secret", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl TokenIssuer for FeishuClient {
    async fn issue_token(&self) -> Result<IssuedToken, FeishuError> {
        self.request_token().await
    }
}

/// Decode a JSON envelope.
///
/// Feishu reports most failures as a JSON body with a non-zero `code`, even
/// on 4xx statuses, so the body is tried first and the status only decides
/// the error when the body is not an envelope.
async fn parse_body<T>(response: reqwest::Response) -> Result<T, FeishuError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let text = response.text().await?;
    debug!(status = status.as_u16(), "Feishu API responded");

    match serde_json::from_str::<T>(&text) {
        Ok(body) => Ok(body),
        Err(_) if !status.is_success() => Err(FeishuError::HttpStatus {
            status: status.as_u16(),
            body: text,
        }),
        Err(e) => Err(FeishuError::InvalidResponse {
            message: e.to_string(),
        }),
    }
}

// ============================================================================
// Inbound event callbacks
// ============================================================================

/// v2 event envelope (`header.event_type` + `event`).
///
/// The URL verification handshake is answered from the untyped body by
/// [`verification_challenge`] before this is decoded.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeishuEventPayload {
    #[serde(default)]
    pub header: Option<EventHeader>,

    #[serde(default)]
    pub event: Option<EventBody>,
}

impl FeishuEventPayload {
    pub fn event_type(&self) -> Option<&str> {
        self.header.as_ref().and_then(|h| h.event_type.as_deref())
    }

    /// Chat the event refers to, if non-empty.
    pub fn chat_id(&self) -> Option<&str> {
        self.event
            .as_ref()
            .and_then(|e| e.chat_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventHeader {
    #[serde(default)]
    pub event_type: Option<String>,

    #[serde(default)]
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventBody {
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// Challenge to echo when `body` is a URL verification callback.
///
/// Only `type` is inspected, so unrelated fields never block the handshake.
/// A missing challenge is echoed as `null`.
pub fn verification_challenge(body: &Value) -> Option<Value> {
    if body.get("type").and_then(Value::as_str) != Some(URL_VERIFICATION) {
        return None;
    }
    Some(body.get("challenge").cloned().unwrap_or(Value::Null))
}

/// Recover a URL verification challenge from a body that is not valid JSON.
///
/// Only bodies mentioning `challenge` are considered. A leading BOM is
/// dropped, the first JSON value is decoded and trailing bytes are ignored.
pub fn lenient_challenge(raw: &[u8]) -> Option<Value> {
    let text = String::from_utf8_lossy(raw);
    if !text.contains("challenge") {
        return None;
    }

    let text = text.trim_start_matches('\u{feff}');
    let first = serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()?
        .ok()?;

    verification_challenge(&first)
}

#[cfg(test)]
#[path = "feishu_tests.rs"]
mod tests;
