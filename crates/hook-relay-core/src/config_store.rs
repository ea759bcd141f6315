//! # Relay Configuration Store
//!
//! Loads and persists the JSON relay configuration file that holds the Feishu
//! app credentials, the default and current chat ids, and the per-project
//! chat mapping.
//!
//! The file is the only persistent state of the relay. It is read once at
//! startup and rewritten as a whole whenever the current chat changes. Keys
//! the relay does not know about are carried through every rewrite.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info, warn};

/// Key holding the Feishu app id.
pub const APP_ID_KEY: &str = "feishu_app_id";

/// Key holding the Feishu app secret.
pub const APP_SECRET_KEY: &str = "feishu_app_secret";

/// Key holding the chat used when nothing else is known.
pub const DEFAULT_CHAT_ID_KEY: &str = "default_chat_id";

/// Key holding the currently active chat.
pub const CURRENT_CHAT_ID_KEY: &str = "feishu_chat_id";

/// Key holding the repository to chat mapping.
pub const PROJECT_CHAT_MAPPING_KEY: &str = "project_chat_mapping";

/// Prefix of the placeholder values shipped in example configuration files.
pub const PLACEHOLDER_PREFIX: &str = "YOUR_";

const REQUIRED_KEYS: [&str; 3] = [APP_ID_KEY, APP_SECRET_KEY, DEFAULT_CHAT_ID_KEY];

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while reading or writing the relay configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("Configuration file not found: {path}")]
    MissingFile { path: String },

    #[error("Configuration file {path} is not valid JSON: {message}")]
    InvalidJson { path: String, message: String },

    #[error("Configuration file {path} must contain a JSON object")]
    NotAnObject { path: String },

    #[error("Configuration file {path} is missing required keys: {}", .keys.join(", "))]
    MissingRequiredKey { path: String, keys: Vec<String> },

    #[error("I/O error on configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// AppConfig
// ============================================================================

/// Resolved relay configuration.
///
/// `app_id`, `app_secret` and `default_chat_id` are never empty once a load
/// succeeded, and `current_chat_id` falls back to `default_chat_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub app_id: String,
    #[serde(skip_serializing)]
    pub app_secret: String,
    pub default_chat_id: String,
    pub current_chat_id: String,
    pub project_chat_mapping: BTreeMap<String, String>,
}

impl AppConfig {
    /// Whether the credentials look like real values rather than placeholders.
    pub fn credentials_configured(&self) -> bool {
        is_real_credential(&self.app_id) && is_real_credential(&self.app_secret)
    }

    /// Rebuild a document from the in-memory values.
    ///
    /// Used when the file can no longer be read but a write is still needed.
    fn to_document(&self) -> Map<String, Value> {
        let mapping: Map<String, Value> = self
            .project_chat_mapping
            .iter()
            .map(|(repo, chat)| (repo.clone(), Value::String(chat.clone())))
            .collect();

        let mut document = Map::new();
        document.insert(APP_ID_KEY.to_string(), Value::String(self.app_id.clone()));
        document.insert(
            APP_SECRET_KEY.to_string(),
            Value::String(self.app_secret.clone()),
        );
        document.insert(
            DEFAULT_CHAT_ID_KEY.to_string(),
            Value::String(self.default_chat_id.clone()),
        );
        document.insert(
            CURRENT_CHAT_ID_KEY.to_string(),
            Value::String(self.current_chat_id.clone()),
        );
        document.insert(PROJECT_CHAT_MAPPING_KEY.to_string(), Value::Object(mapping));
        document
    }
}

fn is_real_credential(value: &str) -> bool {
    !value.is_empty() && !value.starts_with(PLACEHOLDER_PREFIX)
}

/// Read a non-empty string value from the document.
fn string_value(document: &Map<String, Value>, key: &str) -> Option<String> {
    document
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ============================================================================
// ConfigStore
// ============================================================================

/// File-backed relay configuration.
///
/// Holds the resolved [`AppConfig`] in memory. Mutations go to disk first and
/// only touch the in-memory copy after the write succeeded.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    state: RwLock<AppConfig>,
}

impl ConfigStore {
    /// Load the configuration file at `path`.
    ///
    /// When `feishu_chat_id` is missing it is set to `default_chat_id`, and a
    /// missing `project_chat_mapping` becomes an empty mapping. Either repair
    /// is written back to the file; a failed write-back is logged only.
    ///
    /// # Errors
    /// - `ConfigStoreError::MissingFile` - no file at `path`
    /// - `ConfigStoreError::InvalidJson` / `NotAnObject` - unparsable content
    /// - `ConfigStoreError::MissingRequiredKey` - app id, secret or default chat id absent
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigStoreError> {
        let path = path.into();
        let mut document = read_document(&path)?;

        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| string_value(&document, key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            error!(
                path = %path.display(),
                missing_keys = %missing.join(", "),
                "Relay configuration is missing required keys"
            );
            return Err(ConfigStoreError::MissingRequiredKey {
                path: path.display().to_string(),
                keys: missing,
            });
        }

        // Presence checked above.
        let app_id = string_value(&document, APP_ID_KEY).unwrap_or_default();
        let app_secret = string_value(&document, APP_SECRET_KEY).unwrap_or_default();
        let default_chat_id = string_value(&document, DEFAULT_CHAT_ID_KEY).unwrap_or_default();

        let mut needs_write = false;

        let current_chat_id = match string_value(&document, CURRENT_CHAT_ID_KEY) {
            Some(current) => {
                info!(chat_id = %current, "Loaded current chat id from configuration");
                current
            }
            None => {
                info!(
                    chat_id = %default_chat_id,
                    "No current chat id configured; falling back to default chat id"
                );
                document.insert(
                    CURRENT_CHAT_ID_KEY.to_string(),
                    Value::String(default_chat_id.clone()),
                );
                needs_write = true;
                default_chat_id.clone()
            }
        };

        let project_chat_mapping = match document.get(PROJECT_CHAT_MAPPING_KEY) {
            Some(Value::Object(entries)) => parse_mapping(entries),
            Some(other) => {
                warn!(
                    value = %other,
                    "project_chat_mapping is not an object; using an empty mapping"
                );
                BTreeMap::new()
            }
            None => {
                document.insert(
                    PROJECT_CHAT_MAPPING_KEY.to_string(),
                    Value::Object(Map::new()),
                );
                needs_write = true;
                BTreeMap::new()
            }
        };

        if needs_write {
            match write_document(&path, &document) {
                Ok(()) => info!(path = %path.display(), "Persisted repaired relay configuration"),
                Err(e) => error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to persist repaired relay configuration"
                ),
            }
        }

        info!(
            path = %path.display(),
            mapped_projects = project_chat_mapping.len(),
            "Relay configuration loaded"
        );

        Ok(Self {
            path,
            state: RwLock::new(AppConfig {
                app_id,
                app_secret,
                default_chat_id,
                current_chat_id,
                project_chat_mapping,
            }),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current in-memory configuration.
    pub fn snapshot(&self) -> AppConfig {
        self.read_state().clone()
    }

    pub fn app_id(&self) -> String {
        self.read_state().app_id.clone()
    }

    pub fn app_secret(&self) -> String {
        self.read_state().app_secret.clone()
    }

    pub fn default_chat_id(&self) -> String {
        self.read_state().default_chat_id.clone()
    }

    /// Chat currently receiving notifications that have no project mapping.
    pub fn current_chat_id(&self) -> String {
        self.read_state().current_chat_id.clone()
    }

    pub fn project_chat_mapping(&self) -> BTreeMap<String, String> {
        self.read_state().project_chat_mapping.clone()
    }

    pub fn credentials_configured(&self) -> bool {
        self.read_state().credentials_configured()
    }

    /// Persist `new_id` as the current chat id.
    ///
    /// Re-reads the file so concurrent manual edits survive. If the file can
    /// no longer be read the document is rebuilt from the in-memory values.
    /// The file is replaced atomically and the in-memory current chat id
    /// changes only after the replacement succeeded.
    pub async fn save_current_chat_id(&self, new_id: &str) -> Result<(), ConfigStoreError> {
        let mut document = match read_document_async(&self.path).await {
            Ok(document) => document,
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not re-read relay configuration; rebuilding from memory"
                );
                self.snapshot().to_document()
            }
        };

        document.insert(
            CURRENT_CHAT_ID_KEY.to_string(),
            Value::String(new_id.to_string()),
        );

        if let Err(e) = persist_document(&self.path, &document).await {
            error!(
                path = %self.path.display(),
                chat_id = %new_id,
                error = %e,
                "Failed to save current chat id"
            );
            return Err(e);
        }

        self.write_state().current_chat_id = new_id.to_string();
        info!(chat_id = %new_id, path = %self.path.display(), "Saved current chat id");
        Ok(())
    }

    /// Fetch `default_chat_id` straight from the file.
    ///
    /// Returns `None` when the file cannot be read or the key is empty.
    pub async fn default_chat_id_from_file(&self) -> Option<String> {
        match read_document_async(&self.path).await {
            Ok(document) => string_value(&document, DEFAULT_CHAT_ID_KEY),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not read default chat id from configuration file"
                );
                None
            }
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, AppConfig> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, AppConfig> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_mapping(entries: &Map<String, Value>) -> BTreeMap<String, String> {
    entries
        .iter()
        .filter_map(|(repo, chat)| match chat.as_str() {
            Some(chat) => Some((repo.clone(), chat.to_string())),
            None => {
                warn!(repository = %repo, "Ignoring non-string chat id in project mapping");
                None
            }
        })
        .collect()
}

fn read_document(path: &Path) -> Result<Map<String, Value>, ConfigStoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| read_error(path, e))?;
    parse_document(path, &contents)
}

async fn read_document_async(path: &Path) -> Result<Map<String, Value>, ConfigStoreError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| read_error(path, e))?;
    parse_document(path, &contents)
}

fn read_error(path: &Path, e: std::io::Error) -> ConfigStoreError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ConfigStoreError::MissingFile {
            path: path.display().to_string(),
        }
    } else {
        io_error(path, e)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> ConfigStoreError {
    ConfigStoreError::Io {
        path: path.display().to_string(),
        source: e,
    }
}

fn parse_document(path: &Path, contents: &str) -> Result<Map<String, Value>, ConfigStoreError> {
    let value: Value =
        serde_json::from_str(contents).map_err(|e| ConfigStoreError::InvalidJson {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    match value {
        Value::Object(document) => Ok(document),
        _ => Err(ConfigStoreError::NotAnObject {
            path: path.display().to_string(),
        }),
    }
}

fn encode_document(path: &Path, document: &Map<String, Value>) -> Result<String, ConfigStoreError> {
    let mut contents = serde_json::to_string_pretty(document)
        .map_err(|e| io_error(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    contents.push('\n');
    Ok(contents)
}

/// Sibling file a new document is staged in before it replaces `path`.
fn staging_path(path: &Path) -> PathBuf {
    path.with_extension("tmp")
}

/// Replace the file at `path` with `document` during startup repairs.
///
/// Staged in a sibling file and renamed over the target, so the file on disk
/// is always either the old or the new document.
fn write_document(path: &Path, document: &Map<String, Value>) -> Result<(), ConfigStoreError> {
    use std::io::Write;

    let contents = encode_document(path, document)?;
    let temp_path = staging_path(path);

    let result = std::fs::File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        })
        .and_then(|()| std::fs::rename(&temp_path, path));

    if let Err(e) = result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(io_error(path, e));
    }
    Ok(())
}

/// Async counterpart of [`write_document`] used while serving requests.
async fn persist_document(
    path: &Path,
    document: &Map<String, Value>,
) -> Result<(), ConfigStoreError> {
    use tokio::io::AsyncWriteExt;

    let contents = encode_document(path, document)?;
    let temp_path = staging_path(path);

    let result = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(io_error(path, e));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_store_tests.rs"]
mod tests;
