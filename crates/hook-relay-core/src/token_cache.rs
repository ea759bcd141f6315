//! Tenant access token caching.
//!
//! Feishu tenant tokens live for about two hours. The cache keeps the most
//! recent token and refreshes it five minutes before the provider-reported
//! expiry.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::feishu::FeishuError;

/// Safety margin subtracted from the provider-reported lifetime.
pub const REFRESH_MARGIN_SECONDS: i64 = 300;

/// Lifetime assumed when the provider does not report one.
pub const DEFAULT_EXPIRE_SECONDS: i64 = 7200;

/// A freshly issued token as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in_seconds: i64,
}

/// Cached token with its expiry instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// A token is usable only strictly before its expiry instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Source of new tenant access tokens.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Request a new token from the provider.
    async fn issue_token(&self) -> Result<IssuedToken, FeishuError>;
}

/// Single-slot token cache.
///
/// Two callers that both find the slot expired will both refresh; the last
/// successful refresh wins. A failed refresh never touches the slot.
pub struct TokenCache {
    issuer: Arc<dyn TokenIssuer>,
    entry: RwLock<Option<CachedToken>>,
    refresh_margin: Duration,
}

impl TokenCache {
    pub fn new(issuer: Arc<dyn TokenIssuer>) -> Self {
        Self {
            issuer,
            entry: RwLock::new(None),
            refresh_margin: Duration::seconds(REFRESH_MARGIN_SECONDS),
        }
    }

    /// Return a valid token, refreshing it from the issuer when needed.
    ///
    /// # Errors
    /// - `FeishuError::AuthFailed` - the provider rejected the credentials
    /// - `FeishuError::Network` - the provider could not be reached
    pub async fn get_token(&self) -> Result<String, FeishuError> {
        let now = Utc::now();
        if let Some(cached) = self.cached().filter(|c| c.is_valid_at(now)) {
            debug!(expires_at = %cached.expires_at(), "Using cached tenant access token");
            return Ok(cached.token);
        }

        let issued = match self.issuer.issue_token().await {
            Ok(issued) => issued,
            Err(e) => {
                warn!(error = %e, "Tenant access token refresh failed");
                return Err(e);
            }
        };

        let expires_at = now + Duration::seconds(issued.expires_in_seconds) - self.refresh_margin;
        self.store(CachedToken::new(issued.token.clone(), expires_at));
        info!(expires_at = %expires_at, "Obtained tenant access token");

        Ok(issued.token)
    }

    /// Currently cached entry, valid or not.
    pub fn cached(&self) -> Option<CachedToken> {
        self.entry.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the cached entry.
    pub fn store(&self, token: CachedToken) {
        *self.entry.write().unwrap_or_else(|e| e.into_inner()) = Some(token);
    }

    /// Drop the cached entry so the next call refreshes.
    pub fn invalidate(&self) {
        *self.entry.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
#[path = "token_cache_tests.rs"]
mod tests;
