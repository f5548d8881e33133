use std::{env, fs, time::Duration};

use kindwatch_config::ConfigError;
use kindwatch_config::loader::{load_config, load_config_with_default_path};

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("kindwatch.toml");

    let toml_content = r#"
[controller]
name = "widget-controller"
handler_timeout_ms = 1500

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.controller.name, "widget-controller");
    assert_eq!(
        cfg.controller.handler_timeout(),
        Some(Duration::from_millis(1500))
    );
    assert_eq!(cfg.logging.level, "debug");

    // 2) Env override should win over file
    unsafe {
        env::set_var("KINDWATCH__CONTROLLER__HANDLER_TIMEOUT_MS", "0");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.controller.handler_timeout(), None);
    unsafe {
        env::remove_var("KINDWATCH__CONTROLLER__HANDLER_TIMEOUT_MS");
    }

    // 3) Invalid log level should error
    let invalid_path = dir.path().join("invalid.toml");
    fs::write(&invalid_path, "[logging]\nlevel = \"loud\"\n").expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("logging.level")));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config_with_default_path(Some(&path)).expect("defaults should load");
    assert_eq!(cfg.controller.name, "controller");
    assert_eq!(cfg.logging.level, "info");
    assert_eq!(cfg.controller.handler_timeout(), None);
}
