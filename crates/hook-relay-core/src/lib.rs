//! # Hook Relay Core
//!
//! Core logic for relaying GitHub push notifications into Feishu chats.
//!
//! This crate contains everything that does not depend on the HTTP server:
//! - [`config_store`]: the JSON relay configuration file (credentials and chat routing)
//! - [`token_cache`]: the cached Feishu tenant access token
//! - [`router`]: repository to chat id resolution
//! - [`formatter`]: commit classification and notification card assembly
//! - [`github`]: the subset of the GitHub push payload the relay reads
//! - [`feishu`]: the Feishu Open API client and inbound event types
//!
//! ## Usage
//!
//! ```rust
//! use hook_relay_core::formatter::classify_commit;
//! use hook_relay_core::router::resolve_chat_id;
//! use std::collections::BTreeMap;
//!
//! let kind = classify_commit("feat(api): add project mapping endpoint");
//! assert_eq!(kind.label, "Feature");
//!
//! let mapping = BTreeMap::new();
//! assert_eq!(resolve_chat_id("octo/repo", &mapping, "oc_fallback"), "oc_fallback");
//! ```

pub mod config_store;
pub mod feishu;
pub mod formatter;
pub mod github;
pub mod router;
pub mod token_cache;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub use config_store::{AppConfig, ConfigStore, ConfigStoreError};
pub use feishu::{FeishuApiConfig, FeishuClient, FeishuError};
pub use formatter::{build_card, classify_commit, format_commit, CommitKind, NotificationCard};
pub use github::{CommitEvent, PushEvent};
pub use router::resolve_chat_id;
pub use token_cache::{CachedToken, IssuedToken, TokenCache, TokenIssuer};

// ============================================================================
// Notification delivery seam
// ============================================================================

/// Delivers a finished notification card to a chat.
///
/// The HTTP layer depends only on this trait so handlers can be exercised
/// without a live Feishu tenant.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Send `card` to the chat identified by `chat_id`.
    async fn send_card(&self, chat_id: &str, card: &NotificationCard) -> Result<(), FeishuError>;
}

/// [`NotificationSender`] backed by the Feishu Open API.
///
/// Obtains a bearer token from the shared [`TokenCache`] for every send. A
/// token Feishu refuses is dropped from the cache so the next send refreshes.
pub struct FeishuNotifier {
    client: Arc<FeishuClient>,
    tokens: Arc<TokenCache>,
}

impl FeishuNotifier {
    pub fn new(client: Arc<FeishuClient>, tokens: Arc<TokenCache>) -> Self {
        Self { client, tokens }
    }

    /// Token cache used by this notifier.
    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }
}

#[async_trait]
impl NotificationSender for FeishuNotifier {
    #[instrument(skip(self, card), fields(chat_id = %chat_id))]
    async fn send_card(&self, chat_id: &str, card: &NotificationCard) -> Result<(), FeishuError> {
        let token = self.tokens.get_token().await?;
        let message_id = match self.client.send_card(&token, chat_id, card).await {
            Ok(message_id) => message_id,
            Err(e) => {
                if e.is_token_rejected() {
                    warn!(error = %e, "Feishu refused the cached token; dropping it");
                    self.tokens.invalidate();
                }
                return Err(e);
            }
        };
        debug!(message_id = ?message_id, "Card accepted by Feishu");
        Ok(())
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
