use super::data::{Settings, DEFAULT_WORKSPACE};
use super::io::{ConfigError, SettingsStore};
use std::fs;
use tempfile::TempDir;

fn store_in(temp_dir: &TempDir) -> SettingsStore {
    SettingsStore::new(temp_dir.path().join("nested").join("config.toml"))
}

#[test]
fn fresh_settings_have_identity_and_default_workspace() {
    let first = Settings::fresh(false);
    let second = Settings::fresh(false);
    assert_ne!(first.installation_id, second.installation_id);
    assert_eq!(first.default_workspace, DEFAULT_WORKSPACE);
    assert!(first.provider.is_none());
    assert!(first.model_label().is_none());
}

#[test]
fn dev_mode_uses_a_separate_data_dir() {
    let dev = Settings::fresh(true);
    assert!(dev.data_dir.ends_with("dev"));
    assert!(!Settings::fresh(false).data_dir.ends_with("dev"));
}

#[test]
fn save_then_load_preserves_every_field() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = store_in(&temp_dir);
    assert!(!store.exists());

    let settings = Settings {
        data_dir: temp_dir.path().join("data"),
        provider: Some("openai".to_string()),
        model: Some("gpt-4o".to_string()),
        installation_id: "install-1".to_string(),
        default_workspace: "work".to_string(),
    };
    store.save(&settings).expect("save failed");

    assert!(store.exists());
    assert_eq!(store.load().expect("load failed"), settings);
}

#[test]
fn load_or_init_creates_file_once() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = store_in(&temp_dir);

    let (created, save_error) = store.load_or_init(false).expect("init failed");
    assert!(save_error.is_none());
    assert!(store.exists());

    let (reloaded, _) = store.load_or_init(false).expect("reload failed");
    assert_eq!(reloaded.installation_id, created.installation_id);
}

#[test]
fn corrupt_file_is_a_parse_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = store_in(&temp_dir);
    fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    fs::write(store.path(), "data_dir = [not toml").unwrap();

    match store.load_or_init(false) {
        Err(ConfigError::Parse { path, .. }) => assert_eq!(path, store.path()),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn missing_workspace_field_falls_back_to_default() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = store_in(&temp_dir);
    fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    fs::write(
        store.path(),
        "data_dir = \"/tmp/sc\"\ninstallation_id = \"abc\"\n",
    )
    .unwrap();

    let settings = store.load().expect("load failed");
    assert_eq!(settings.default_workspace, DEFAULT_WORKSPACE);
    assert_eq!(settings.installation_id, "abc");
    assert!(settings.provider.is_none());
}

#[test]
fn summary_lists_mode_and_model() {
    let settings = Settings {
        provider: Some("groq".to_string()),
        model: Some("llama".to_string()),
        ..Settings::fresh(false)
    };
    let summary = settings.summary("Engine + Session", true, std::path::Path::new("/x/config.toml"));
    assert!(summary.contains("Mode: Engine + Session"));
    assert!(summary.contains("Development: true"));
    assert!(summary.contains("Model: groq:llama"));
}
