use godot_interop::config::{BridgeConfig, ConfigError, LogLevel};
use godot_interop::registry::InitializationLevel;
use std::sync::{Mutex, PoisonError};
use tempfile::TempDir;

// Environment variables are process-wide.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn customized() -> BridgeConfig {
    let mut config = BridgeConfig::new();
    config.logging.level = LogLevel::Debug;
    config.logging.log_to_console = false;
    config.diagnostics.max_recent = 32;
    config.diagnostics.panic_on_duplicate_class = true;
    config.minimum_initialization_level = InitializationLevel::Servers;
    config
}

#[test]
fn test_toml_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("godot_interop.toml");
    customized().save_toml(&path).unwrap();

    let loaded = BridgeConfig::from_toml_file(&path).unwrap();
    assert_eq!(loaded.logging.level, LogLevel::Debug);
    assert!(!loaded.logging.log_to_console);
    assert_eq!(loaded.diagnostics.max_recent, 32);
    assert!(loaded.diagnostics.panic_on_duplicate_class);
    assert_eq!(loaded.minimum_initialization_level, InitializationLevel::Servers);
}

#[test]
fn test_json_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("godot_interop.json");
    let mut config = customized();
    config.layout.validate_on_startup = true;
    config.layout.metadata_path = Some(dir.path().join("extension_api.json"));
    config.save_json(&path).unwrap();

    let loaded = BridgeConfig::from_json_file(&path).unwrap();
    assert!(loaded.layout.validate_on_startup);
    assert_eq!(loaded.layout.metadata_path, config.layout.metadata_path);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_missing_and_malformed_files() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        BridgeConfig::from_toml_file(dir.path().join("absent.toml")),
        Err(ConfigError::FileError(_))
    ));

    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ \"logging\": ").unwrap();
    assert!(matches!(BridgeConfig::from_json_file(&path), Err(ConfigError::ParseError(_))));
    assert!(matches!(
        BridgeConfig::from_toml_str("minimum_initialization_level = \"Sometime\""),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_sections_default_independently() {
    let config = BridgeConfig::from_toml_str("[diagnostics]\nmax_recent = 5\nforward_to_engine = false\npanic_on_duplicate_class = false\n").unwrap();
    assert_eq!(config.diagnostics.max_recent, 5);
    assert!(!config.diagnostics.forward_to_engine);
    assert_eq!(config.logging.level, LogLevel::Info);
    assert!(!config.layout.validate_on_startup);
    assert_eq!(config.minimum_initialization_level, InitializationLevel::Scene);
}

#[test]
fn test_validation_errors() {
    let mut config = BridgeConfig::new();
    config.diagnostics.max_recent = 0;
    assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

    let mut config = BridgeConfig::new();
    config.logging.log_to_file = true;
    config.logging.log_file_path = "  ".into();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("log_file_path"));

    let mut config = BridgeConfig::new();
    config.layout.validate_on_startup = true;
    assert!(config.validate().unwrap_err().to_string().contains("metadata_path"));
}

#[test]
fn test_environment_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    std::env::set_var("GODOT_INTEROP_LOG_LEVEL", "warning");
    std::env::set_var("GODOT_INTEROP_FORWARD_DIAGNOSTICS", "false");
    std::env::set_var("GODOT_INTEROP_VALIDATE_LAYOUT", "not-a-bool");

    let mut config = BridgeConfig::new();
    config.apply_env_overrides();
    assert_eq!(config.logging.level, LogLevel::Warn);
    assert!(!config.diagnostics.forward_to_engine);
    assert!(!config.layout.validate_on_startup);

    std::env::set_var("GODOT_INTEROP_LOG_LEVEL", "loud");
    config.apply_env_overrides();
    assert_eq!(config.logging.level, LogLevel::Warn);

    for name in [
        "GODOT_INTEROP_LOG_LEVEL",
        "GODOT_INTEROP_FORWARD_DIAGNOSTICS",
        "GODOT_INTEROP_VALIDATE_LAYOUT",
    ] {
        std::env::remove_var(name);
    }
}
