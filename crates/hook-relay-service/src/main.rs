//! # Hook Relay Service
//!
//! Binary entry point for the GitHub to Feishu notification relay.
//!
//! This executable:
//! - Loads the service configuration from files and environment
//! - Initializes logging
//! - Loads the relay configuration file (credentials and chat routing)
//! - Builds the Feishu client, token cache and notifier
//! - Starts the HTTP server from hook-relay-api

use anyhow::Context;
use hook_relay_api::{start_server, LoggingConfig, ServiceConfig};
use hook_relay_core::{ConfigStore, FeishuClient, FeishuNotifier, NotificationSender, TokenCache};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable naming an explicit service configuration file.
const CONFIG_FILE_ENV: &str = "HOOK_RELAY_CONFIG_FILE";

/// Prefix of environment overrides, e.g. `HR__SERVER__PORT=9090`.
const ENV_PREFIX: &str = "HR";

/// Exit code for any configuration failure.
const CONFIG_EXIT_CODE: i32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let explicit_path = std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|p| !p.is_empty());

    let service_config = match load_service_config(explicit_path.as_deref()) {
        Ok(config) => {
            init_tracing(&config.logging);
            config
        }
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            error!(error = %e, "Could not build service configuration; aborting");
            std::process::exit(CONFIG_EXIT_CODE);
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "Starting hook relay");
    if let Some(path) = &explicit_path {
        info!(path = %path, "Service configuration loaded from explicit path");
    }

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(CONFIG_EXIT_CODE);
    }

    // The relay cannot do anything useful without credentials and a default
    // chat, so a bad relay configuration file stops startup.
    let store = match ConfigStore::load(&service_config.app_config_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(
                path = %service_config.app_config_path,
                error = %e,
                "Relay configuration failed to load; service will not start"
            );
            std::process::exit(CONFIG_EXIT_CODE);
        }
    };

    if !store.credentials_configured() {
        error!("Feishu app id or app secret still holds a placeholder; push events will be rejected");
    }

    let sender = match build_sender(&service_config, &store) {
        Ok(sender) => sender,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to initialise Feishu client");
            std::process::exit(CONFIG_EXIT_CODE);
        }
    };

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        current_chat_id = %store.current_chat_id(),
        "Starting HTTP server"
    );

    if let Err(e) = start_server(service_config, store, sender).await {
        error!(error = %e, "Server terminated with an error");
        std::process::exit(e.exit_code());
    }

    Ok(())
}

// ============================================================================
// Private helpers
// ============================================================================

/// Build the service configuration.
///
/// Sources, later ones overriding earlier ones:
/// 1. `/etc/hook-relay/service.yaml`
/// 2. `./config/service.yaml`
/// 3. `explicit_path`, which must exist when given
/// 4. `HR__`-prefixed environment variables
///
/// Missing optional files fall back to the serde defaults. A malformed file
/// or an uncoercible variable is an error.
fn load_service_config(explicit_path: Option<&str>) -> Result<ServiceConfig, config::ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/hook-relay/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = explicit_path {
        builder = builder.add_source(
            config::File::with_name(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()
}

/// Default directive set for the relay crates at the configured level.
fn default_filter(level: &str) -> String {
    format!(
        "hook_relay_service={level},hook_relay_api={level},hook_relay_core={level},tower_http=debug"
    )
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(&logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wire the Feishu client, shared token cache and notifier.
fn build_sender(
    config: &ServiceConfig,
    store: &ConfigStore,
) -> anyhow::Result<Arc<dyn NotificationSender>> {
    let client = FeishuClient::new(
        config.feishu.to_api_config(),
        store.app_id(),
        store.app_secret(),
    )
    .context("building Feishu HTTP client")?;
    let client = Arc::new(client);
    let tokens = Arc::new(TokenCache::new(client.clone()));

    Ok(Arc::new(FeishuNotifier::new(client, tokens)))
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
