//! Tests for the relay configuration store.

use super::*;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

fn write_config(dir: &TempDir, value: &Value) -> PathBuf {
    let path = dir.path().join("feishu_config.json");
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn read_back(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn complete_config() -> Value {
    json!({
        "feishu_app_id": "cli_a1b2c3",
        "feishu_app_secret": "s3cr3t",
        "default_chat_id": "oc_default",
        "feishu_chat_id": "oc_current",
        "project_chat_mapping": {
            "octo/api": "oc_api",
            "default": "oc_mapped_default"
        }
    })
}

// ============================================================================
// Load Tests
// ============================================================================

mod load_tests {
    use super::*;

    /// Verify a complete file loads every field.
    #[test]
    fn test_load_complete_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &complete_config());

        let store = ConfigStore::load(&path).expect("Should load");

        assert_eq!(store.app_id(), "cli_a1b2c3");
        assert_eq!(store.app_secret(), "s3cr3t");
        assert_eq!(store.default_chat_id(), "oc_default");
        assert_eq!(store.current_chat_id(), "oc_current");
        assert_eq!(
            store.project_chat_mapping().get("octo/api").map(String::as_str),
            Some("oc_api")
        );
        assert_eq!(store.path(), path.as_path());
    }

    /// Verify a missing file is reported as such.
    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = ConfigStore::load(dir.path().join("absent.json"));

        assert!(matches!(result, Err(ConfigStoreError::MissingFile { .. })));
    }

    /// Verify invalid JSON is rejected.
    #[test]
    fn test_load_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feishu_config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = ConfigStore::load(&path);

        assert!(matches!(result, Err(ConfigStoreError::InvalidJson { .. })));
    }

    /// Verify a JSON document that is not an object is rejected.
    #[test]
    fn test_load_non_object_document() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &json!(["feishu_app_id"]));

        let result = ConfigStore::load(&path);

        assert!(matches!(result, Err(ConfigStoreError::NotAnObject { .. })));
    }

    /// Verify that dropping any single required key fails the load.
    #[test]
    fn test_load_fails_for_each_missing_required_key() {
        for key in REQUIRED_KEYS {
            let dir = TempDir::new().unwrap();
            let mut config = complete_config();
            config.as_object_mut().unwrap().remove(key);
            let path = write_config(&dir, &config);

            match ConfigStore::load(&path) {
                Err(ConfigStoreError::MissingRequiredKey { keys, .. }) => {
                    assert_eq!(keys, vec![key.to_string()], "missing key for {}", key);
                }
                other => panic!("Expected MissingRequiredKey for {}, got {:?}", key, other),
            }
        }
    }

    /// Verify empty strings count as missing values.
    #[test]
    fn test_load_treats_empty_values_as_missing() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            &json!({
                "feishu_app_id": "",
                "feishu_app_secret": "s3cr3t",
                "default_chat_id": ""
            }),
        );

        match ConfigStore::load(&path) {
            Err(ConfigStoreError::MissingRequiredKey { keys, .. }) => {
                assert_eq!(keys, vec!["feishu_app_id", "default_chat_id"]);
            }
            other => panic!("Expected MissingRequiredKey, got {:?}", other),
        }
    }

    /// Verify the current chat id falls back to the default and is persisted.
    #[test]
    fn test_load_substitutes_and_persists_default_chat_id() {
        let dir = TempDir::new().unwrap();
        let mut config = complete_config();
        config.as_object_mut().unwrap().remove(CURRENT_CHAT_ID_KEY);
        let path = write_config(&dir, &config);

        let store = ConfigStore::load(&path).expect("Should load");

        assert_eq!(store.current_chat_id(), "oc_default");
        assert_eq!(read_back(&path)[CURRENT_CHAT_ID_KEY], "oc_default");
    }

    /// Verify a missing project mapping becomes an empty object on disk.
    #[test]
    fn test_load_persists_empty_project_mapping() {
        let dir = TempDir::new().unwrap();
        let mut config = complete_config();
        config
            .as_object_mut()
            .unwrap()
            .remove(PROJECT_CHAT_MAPPING_KEY);
        let path = write_config(&dir, &config);

        let store = ConfigStore::load(&path).expect("Should load");

        assert!(store.project_chat_mapping().is_empty());
        assert_eq!(read_back(&path)[PROJECT_CHAT_MAPPING_KEY], json!({}));
    }

    /// Verify self-healing writes keep keys the relay does not know about.
    #[test]
    fn test_load_repair_preserves_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            &json!({
                "feishu_app_id": "cli_a1b2c3",
                "feishu_app_secret": "s3cr3t",
                "default_chat_id": "oc_default",
                "operator_note": "managed by ops"
            }),
        );

        ConfigStore::load(&path).expect("Should load");

        let on_disk = read_back(&path);
        assert_eq!(on_disk["operator_note"], "managed by ops");
        assert_eq!(on_disk[CURRENT_CHAT_ID_KEY], "oc_default");
        assert!(!staging_path(&path).exists());
    }

    /// Verify non-string mapping entries are skipped rather than failing the load.
    #[test]
    fn test_load_skips_non_string_mapping_entries() {
        let dir = TempDir::new().unwrap();
        let mut config = complete_config();
        config[PROJECT_CHAT_MAPPING_KEY]["octo/broken"] = json!(42);
        let path = write_config(&dir, &config);

        let store = ConfigStore::load(&path).expect("Should load");

        let mapping = store.project_chat_mapping();
        assert!(!mapping.contains_key("octo/broken"));
        assert_eq!(mapping.len(), 2);
    }
}

// ============================================================================
// Credential Tests
// ============================================================================

mod credential_tests {
    use super::*;

    fn config_with(app_id: &str, app_secret: &str) -> AppConfig {
        AppConfig {
            app_id: app_id.to_string(),
            app_secret: app_secret.to_string(),
            default_chat_id: "oc_default".to_string(),
            current_chat_id: "oc_default".to_string(),
            project_chat_mapping: BTreeMap::new(),
        }
    }

    #[test]
    fn test_real_credentials_are_configured() {
        assert!(config_with("cli_a1b2c3", "s3cr3t").credentials_configured());
    }

    #[test]
    fn test_placeholder_credentials_are_not_configured() {
        assert!(!config_with("YOUR_APP_ID", "s3cr3t").credentials_configured());
        assert!(!config_with("cli_a1b2c3", "YOUR_APP_SECRET").credentials_configured());
        assert!(!config_with("", "s3cr3t").credentials_configured());
    }

    /// Verify the secret never appears in serialized snapshots.
    #[test]
    fn test_snapshot_serialization_omits_secret() {
        let value = serde_json::to_value(config_with("cli_a1b2c3", "s3cr3t")).unwrap();

        assert!(value.get("app_secret").is_none());
        assert_eq!(value["app_id"], "cli_a1b2c3");
    }
}

// ============================================================================
// Save Tests
// ============================================================================

mod save_tests {
    use super::*;

    /// Verify the new chat id reaches both disk and memory.
    #[tokio::test]
    async fn test_save_current_chat_id_updates_file_and_memory() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &complete_config());
        let store = ConfigStore::load(&path).unwrap();

        store.save_current_chat_id("oc_999").await.expect("Should save");

        assert_eq!(store.current_chat_id(), "oc_999");
        let on_disk = read_back(&path);
        assert_eq!(on_disk[CURRENT_CHAT_ID_KEY], "oc_999");
        assert_eq!(on_disk["project_chat_mapping"]["octo/api"], "oc_api");
    }

    /// Verify edits made to the file after startup survive a save.
    #[tokio::test]
    async fn test_save_rereads_file_before_writing() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &complete_config());
        let store = ConfigStore::load(&path).unwrap();

        let mut edited = complete_config();
        edited["operator_note"] = json!("added later");
        write_config(&dir, &edited);

        store.save_current_chat_id("oc_999").await.unwrap();

        let on_disk = read_back(&path);
        assert_eq!(on_disk["operator_note"], "added later");
        assert_eq!(on_disk[CURRENT_CHAT_ID_KEY], "oc_999");
    }

    /// Verify a corrupted file is rebuilt from the in-memory values.
    #[tokio::test]
    async fn test_save_rebuilds_document_when_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &complete_config());
        let store = ConfigStore::load(&path).unwrap();

        std::fs::write(&path, "garbage").unwrap();
        store.save_current_chat_id("oc_999").await.unwrap();

        let on_disk = read_back(&path);
        assert_eq!(on_disk[APP_ID_KEY], "cli_a1b2c3");
        assert_eq!(on_disk[APP_SECRET_KEY], "s3cr3t");
        assert_eq!(on_disk[DEFAULT_CHAT_ID_KEY], "oc_default");
        assert_eq!(on_disk[CURRENT_CHAT_ID_KEY], "oc_999");
        assert_eq!(on_disk[PROJECT_CHAT_MAPPING_KEY]["octo/api"], "oc_api");
    }

    /// Verify the file is replaced whole and no staging file is left behind.
    #[tokio::test]
    async fn test_save_replaces_file_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &complete_config());
        let store = ConfigStore::load(&path).unwrap();

        for chat in ["oc_1", "oc_2", "oc_3"] {
            store.save_current_chat_id(chat).await.unwrap();

            let on_disk = read_back(&path);
            assert_eq!(on_disk[CURRENT_CHAT_ID_KEY], chat);
            assert!(!staging_path(&path).exists());
        }

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    /// Verify a stale staging file from an interrupted save is overwritten.
    #[tokio::test]
    async fn test_save_ignores_stale_staging_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &complete_config());
        let store = ConfigStore::load(&path).unwrap();
        std::fs::write(staging_path(&path), "{\"half\": ").unwrap();

        store.save_current_chat_id("oc_999").await.unwrap();

        assert_eq!(read_back(&path)[CURRENT_CHAT_ID_KEY], "oc_999");
        assert!(!staging_path(&path).exists());
        assert!(ConfigStore::load(&path).is_ok());
    }

    /// Verify a failed write leaves the in-memory chat id untouched.
    #[tokio::test]
    async fn test_failed_save_keeps_in_memory_chat_id() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &complete_config());
        let store = ConfigStore::load(&path).unwrap();

        // Replacing the file with a directory makes both read and write fail.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let result = store.save_current_chat_id("oc_999").await;

        assert!(matches!(result, Err(ConfigStoreError::Io { .. })));
        assert_eq!(store.current_chat_id(), "oc_current");
        assert!(!staging_path(&path).exists());
    }
}

// ============================================================================
// Default Chat Lookup Tests
// ============================================================================

mod default_chat_tests {
    use super::*;

    /// Verify the default chat id is read from disk rather than memory.
    #[tokio::test]
    async fn test_default_chat_id_from_file_reads_fresh_value() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &complete_config());
        let store = ConfigStore::load(&path).unwrap();

        let mut edited = complete_config();
        edited[DEFAULT_CHAT_ID_KEY] = json!("oc_new_default");
        write_config(&dir, &edited);

        assert_eq!(
            store.default_chat_id_from_file().await.as_deref(),
            Some("oc_new_default")
        );
        assert_eq!(store.default_chat_id(), "oc_default");
    }

    #[tokio::test]
    async fn test_default_chat_id_from_file_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &complete_config());
        let store = ConfigStore::load(&path).unwrap();

        std::fs::remove_file(&path).unwrap();

        assert!(store.default_chat_id_from_file().await.is_none());
    }
}
