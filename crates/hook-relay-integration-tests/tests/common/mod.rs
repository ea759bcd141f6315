//! Common test utilities for hook-relay integration tests
//!
//! This module provides:
//! - A relay wired to a real Feishu client pointed at a wiremock server
//! - Request builders for the relay endpoints
//! - Helpers to inspect what reached the mocked Feishu API

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use hook_relay_api::{create_router, AppState, ServiceConfig, ServiceMetrics};
use hook_relay_core::{
    ConfigStore, FeishuApiConfig, FeishuClient, FeishuNotifier, NotificationSender, TokenCache,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[allow(dead_code)]
pub const TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";
#[allow(dead_code)]
pub const SEND_PATH: &str = "/open-apis/im/v1/messages";

// ============================================================================
// Relay harness
// ============================================================================

/// A relay instance plus the mocked Feishu API it talks to.
#[allow(dead_code)]
pub struct RelayHarness {
    pub feishu: MockServer,
    pub router: Router,
    pub store: Arc<ConfigStore>,
    pub config_path: PathBuf,
    _dir: TempDir,
}

#[allow(dead_code)]
impl RelayHarness {
    /// Start a relay whose relay configuration file holds `relay_config`.
    pub async fn start(relay_config: Value) -> Self {
        let feishu = MockServer::start().await;

        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("feishu_config.json");
        std::fs::write(
            &config_path,
            serde_json::to_string_pretty(&relay_config).unwrap(),
        )
        .unwrap();
        let store = Arc::new(ConfigStore::load(&config_path).expect("relay config should load"));

        let api_config = FeishuApiConfig {
            api_base_url: feishu.uri(),
            ..Default::default()
        };
        let client = Arc::new(
            FeishuClient::new(api_config, store.app_id(), store.app_secret()).unwrap(),
        );
        let tokens = Arc::new(TokenCache::new(client.clone()));
        let sender: Arc<dyn NotificationSender> = Arc::new(FeishuNotifier::new(client, tokens));

        let state = AppState::new(
            ServiceConfig::default(),
            store.clone(),
            sender,
            ServiceMetrics::new().unwrap(),
        );

        Self {
            feishu,
            router: create_router(state),
            store,
            config_path,
            _dir: dir,
        }
    }

    /// Start with [`default_relay_config`].
    pub async fn start_default() -> Self {
        Self::start(default_relay_config()).await
    }

    /// Issue a request against a clone of the router.
    pub async fn call(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Mount a successful token endpoint expected to be hit `times` times.
    pub async fn mount_token(&self, times: u64) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "ok",
                "tenant_access_token": "t-integration",
                "expire": 7200
            })))
            .expect(times)
            .mount(&self.feishu)
            .await;
    }

    /// Mount the message endpoint answering with `body`.
    pub async fn mount_send(&self, body: Value, times: u64) {
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .and(query_param("receive_id_type", "chat_id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(times)
            .mount(&self.feishu)
            .await;
    }

    /// Messages that reached the send endpoint as `(receive_id, card)` pairs.
    pub async fn sent_cards(&self) -> Vec<(String, Value)> {
        self.feishu
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == SEND_PATH)
            .map(|request| {
                let body: Value = serde_json::from_slice(&request.body).unwrap();
                let card: Value =
                    serde_json::from_str(body["content"].as_str().unwrap()).unwrap();
                (body["receive_id"].as_str().unwrap().to_string(), card)
            })
            .collect()
    }

    /// The relay configuration file as currently stored on disk.
    pub fn config_on_disk(&self) -> Value {
        serde_json::from_str(&std::fs::read_to_string(&self.config_path).unwrap()).unwrap()
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn default_relay_config() -> Value {
    json!({
        "feishu_app_id": "cli_integration",
        "feishu_app_secret": "integration-secret",
        "default_chat_id": "oc_default",
        "feishu_chat_id": "oc_current",
        "project_chat_mapping": {
            "acme/payments": "oc_payments"
        }
    })
}

#[allow(dead_code)]
pub fn push_payload(repository: &str, commits: Value) -> Value {
    json!({
        "ref": "refs/heads/main",
        "compare": format!("https://github.com/{repository}/compare/a1...b2"),
        "repository": { "full_name": repository },
        "pusher": { "name": "release-bot" },
        "commits": commits
    })
}

// ============================================================================
// Requests
// ============================================================================

#[allow(dead_code)]
pub fn github_request(event_type: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook/github")
        .header("content-type", "application/json")
        .header("x-github-event", event_type)
        .body(body.into())
        .unwrap()
}

#[allow(dead_code)]
pub fn feishu_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook/feishu_events")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

#[allow(dead_code)]
pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
