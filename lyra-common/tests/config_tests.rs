//! Configuration resolution tests
//!
//! Tests that manipulate LYRA_ROOT_FOLDER or LYRA_OPENAI_API_KEY are marked
//! with #[serial] so they never race on the process environment.

use lyra_common::config::{
    load_toml_config, resolve_api_key, resolve_root_folder, TomlConfig, API_KEY_ENV,
    ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_missing_config_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("does-not-exist.toml");

    let config = load_toml_config(Some(&path)).unwrap();
    assert_eq!(config.port, TomlConfig::default().port);
    assert!(config.root_folder.is_none());
}

#[test]
fn test_malformed_config_file_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "port = \"not a number").unwrap();

    let result = load_toml_config(Some(&path));
    assert!(matches!(result, Err(lyra_common::Error::Config(_))));
}

#[test]
fn test_config_file_sections_are_read() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lyra-enrich.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/lyra"

[pipeline]
retry_max_attempts = 3

[storage]
public_base_url = "https://media.example.com"
"#,
    )
    .unwrap();

    let config = load_toml_config(Some(&path)).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/lyra")));
    assert_eq!(config.pipeline.retry_max_attempts, 3);
    assert_eq!(config.storage.public_base_url, "https://media.example.com");
    assert_eq!(config.storage.grant_ttl_secs, 3600);
}

#[test]
#[serial]
fn test_root_folder_priority_cli_env_toml() {
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    assert_eq!(
        resolve_root_folder(Some(Path::new("/from/cli")), &toml),
        PathBuf::from("/from/cli")
    );
    assert_eq!(resolve_root_folder(None, &toml), PathBuf::from("/from/env"));

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(resolve_root_folder(None, &toml), PathBuf::from("/from/toml"));

    let empty = TomlConfig::default();
    assert!(!resolve_root_folder(None, &empty).as_os_str().is_empty());
}

#[test]
#[serial]
fn test_api_key_environment_overrides_toml() {
    let mut toml = TomlConfig::default();
    toml.providers.api_key = Some("toml-key".to_string());

    env::set_var(API_KEY_ENV, "env-key");
    assert_eq!(resolve_api_key(&toml), Some("env-key".to_string()));

    env::set_var(API_KEY_ENV, "   ");
    assert_eq!(resolve_api_key(&toml), Some("toml-key".to_string()));

    env::remove_var(API_KEY_ENV);
    toml.providers.api_key = None;
    assert_eq!(resolve_api_key(&toml), None);
}
