//! Coverage for config parsing, env overrides and origin validation setup.

use std::path::PathBuf;

use editor_bridge::config::{load_config, Config, ORIGIN_ENV, ORIGIN_REGEX_ENV, KERNEL_ROOT_ENV};

const FULL_CONFIG: &str = r#"
[origin]
pattern = '^https://[a-z0-9-]+\.preview\.example\.com$'
exact = "https://editor.example.com"

[kernel]
root = "/srv/workspace"

[kernel.installer]
program = "pip"
args = ["install", "--target", "site-packages"]

[bridge]
channel_capacity = 16
drain_timeout_secs = 3

[app]
entrypoint = "main.py"
requirements = ["numpy"]

[app.files."main.py"]
content = "import numpy"
"#;

#[test]
fn parse_full_config() {
    let config = Config::from_toml(FULL_CONFIG).expect("should parse");
    assert_eq!(config.kernel.root, Some(PathBuf::from("/srv/workspace")));
    let installer = config.kernel.installer.as_ref().expect("installer");
    assert_eq!(installer.program, "pip");
    assert_eq!(installer.args, vec!["install", "--target", "site-packages"]);
    assert_eq!(config.bridge.channel_capacity, 16);
    assert_eq!(config.bridge.drain_timeout_secs, 3);

    let app = config.app.as_ref().expect("app");
    assert_eq!(app.entrypoint, "main.py");
    assert_eq!(app.requirements, vec!["numpy"]);
}

#[test]
fn configured_pattern_governs_validator() {
    let config = Config::from_toml(FULL_CONFIG).expect("should parse");
    let validator = config.origin.validator().expect("validator");
    assert!(validator.is_authorized("https://pr-12.preview.example.com"));
    assert!(!validator.is_authorized("https://editor.example.com"));
}

#[test]
fn partial_bridge_section_uses_defaults() {
    let config = Config::from_toml("[bridge]\ndrain_timeout_secs = 1\n").expect("should parse");
    assert_eq!(config.bridge.channel_capacity, 64);
    assert_eq!(config.bridge.drain_timeout_secs, 1);
}

#[test]
fn invalid_pattern_fails_validator_construction() {
    let config = Config::from_toml("[origin]\npattern = \"(\"\n").expect("should parse");
    assert!(config.origin.validator().is_err());
}

#[test]
fn env_overrides_config_values() {
    let mut config = Config::from_toml(FULL_CONFIG).expect("should parse");
    config.apply_overrides(|key| match key {
        k if k == ORIGIN_ENV => Some("https://studio.example.org".to_owned()),
        k if k == KERNEL_ROOT_ENV => Some("/tmp/from-env".to_owned()),
        _ => None,
    });

    // An env origin replaces the whole file section, pattern included.
    assert_eq!(config.origin.pattern, None);
    assert_eq!(
        config.origin.exact.as_deref(),
        Some("https://studio.example.org")
    );
    assert_eq!(config.kernel.root, Some(PathBuf::from("/tmp/from-env")));

    let validator = config.origin.validator().expect("validator");
    assert!(validator.is_authorized("https://studio.example.org"));
}

#[test]
fn env_regex_wins_over_env_exact() {
    let mut config = Config::default();
    config.apply_overrides(|key| match key {
        k if k == ORIGIN_REGEX_ENV => Some(r"\.example\.net$".to_owned()),
        k if k == ORIGIN_ENV => Some("https://editor.example.com".to_owned()),
        _ => None,
    });
    let validator = config.origin.validator().expect("validator");
    assert!(validator.is_authorized("https://a.example.net"));
    assert!(!validator.is_authorized("https://editor.example.com"));
}

#[test]
fn empty_env_values_are_ignored() {
    let mut config = Config::from_toml(FULL_CONFIG).expect("should parse");
    config.apply_overrides(|_| Some(String::new()));
    assert!(config.origin.pattern.is_some());
    assert_eq!(config.kernel.root, Some(PathBuf::from("/srv/workspace")));
}

#[test]
fn missing_config_file_yields_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = load_config(&dir.path().join("absent.toml")).expect("defaults");
    assert!(config.origin.pattern.is_none());
    assert!(config.app.is_none());
}

#[test]
fn malformed_config_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[bridge\nchannel_capacity = ").expect("write");
    assert!(load_config(&path).is_err());
}
