use bucket_sync::b2::{B2Credentials, DEFAULT_API_URL};
use bucket_sync::load_config::{load_config, Settings};
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

/// A full settings file maps onto SyncConfig field by field.
#[test]
#[serial]
fn test_load_config_all_fields() {
    let config_yaml = r#"
directories:
  - /srv/photos
  - /srv/scans
force: true
upload_concurrency: 2
delete_concurrency: 8
api_url: https://api.example.test
retry:
  max_retries: 5
  base_delay_ms: 200
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let settings = load_config(config_file.path()).expect("Config should load");
    assert_eq!(settings.api_url.as_deref(), Some("https://api.example.test"));

    let config = settings
        .into_sync_config("photos".to_string(), vec![], false)
        .unwrap();
    assert_eq!(config.bucket, "photos");
    assert_eq!(
        config.directories,
        vec![PathBuf::from("/srv/photos"), PathBuf::from("/srv/scans")]
    );
    assert!(config.force);
    assert_eq!(config.upload_concurrency, 2);
    assert_eq!(config.delete_concurrency, 8);
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.base_delay, Duration::from_millis(200));
}

/// An empty file yields defaults, and no directories means the working directory.
#[test]
#[serial]
fn test_load_config_empty_file_uses_defaults() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "").unwrap();

    let settings = load_config(config_file.path()).expect("Config should load");
    assert_eq!(settings, Settings::default());

    let config = settings
        .into_sync_config("photos".to_string(), vec![], false)
        .unwrap();
    assert_eq!(config.directories, vec![env::current_dir().unwrap()]);
    assert_eq!(config.upload_concurrency, 1);
    assert_eq!(config.delete_concurrency, 4);
    assert!(!config.force);
}

#[test]
#[serial]
fn test_load_config_rejects_unknown_keys() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "bucket_name: photos\n").unwrap();

    let err = load_config(config_file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));
}

#[test]
#[serial]
fn test_load_config_missing_file() {
    let err = load_config("/definitely/not/here/sync.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
#[serial]
fn test_credentials_from_env() {
    env::set_var("B2_APPLICATION_KEY_ID", "key-id");
    env::set_var("B2_APPLICATION_KEY", "secret");
    env::remove_var("B2_API_URL");

    let creds = B2Credentials::from_env(None).expect("credentials load");
    assert_eq!(creds.key_id, "key-id");
    assert_eq!(creds.application_key, "secret");
    assert_eq!(creds.api_url, DEFAULT_API_URL);

    let creds = B2Credentials::from_env(Some("https://from-file.test")).unwrap();
    assert_eq!(creds.api_url, "https://from-file.test");

    env::set_var("B2_API_URL", "https://from-env.test");
    let creds = B2Credentials::from_env(Some("https://from-file.test")).unwrap();
    assert_eq!(creds.api_url, "https://from-env.test");

    env::remove_var("B2_API_URL");
    env::remove_var("B2_APPLICATION_KEY_ID");
    env::remove_var("B2_APPLICATION_KEY");
}

#[test]
#[serial]
fn test_credentials_require_key_id() {
    env::remove_var("B2_APPLICATION_KEY_ID");
    env::set_var("B2_APPLICATION_KEY", "secret");

    let err = B2Credentials::from_env(None).unwrap_err();
    assert!(err.to_string().contains("B2_APPLICATION_KEY_ID"));

    env::remove_var("B2_APPLICATION_KEY");
}
