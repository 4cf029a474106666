//! Integration tests for configuration parsing
//!
//! Tests the on-disk TOML shape of the usbraw configuration:
//! - Minimal and full files
//! - Filter patterns
//! - Invalid configuration handling
//!
//! Run with: `cargo test -p usbraw-cli --test config_tests`

use usbraw::DeviceFilter;

const MINIMAL_CONFIG: &str = r#"
[general]
log_level = "info"
"#;

const FULL_CONFIG: &str = r#"
[general]
log_level = "debug"

[usb]
timeout_ms = 5000
filters = ["0x1ab1:*", "0x0957:0x1755", "*:0x04ce"]
"#;

#[test]
fn test_minimal_config_parses() {
    let config: toml::Value = toml::from_str(MINIMAL_CONFIG).unwrap();

    assert_eq!(config["general"]["log_level"].as_str(), Some("info"));
    assert!(config.get("usb").is_none());
}

#[test]
fn test_full_config_parses() {
    let config: toml::Value = toml::from_str(FULL_CONFIG).unwrap();

    assert_eq!(config["general"]["log_level"].as_str(), Some("debug"));
    assert_eq!(config["usb"]["timeout_ms"].as_integer(), Some(5000));

    let filters = config["usb"]["filters"].as_array().unwrap();
    assert_eq!(filters.len(), 3);
}

#[test]
fn test_full_config_filters_are_valid_patterns() {
    let config: toml::Value = toml::from_str(FULL_CONFIG).unwrap();

    let filters: Vec<DeviceFilter> = config["usb"]["filters"]
        .as_array()
        .unwrap()
        .iter()
        .map(|value| value.as_str().unwrap().parse().unwrap())
        .collect();

    assert!(filters[0].matches_ids(0x1AB1, 0x0001));
    assert!(filters[1].matches_ids(0x0957, 0x1755));
    assert!(!filters[1].matches_ids(0x0957, 0x1756));
    assert!(filters[2].matches_ids(0xFFFF, 0x04CE));
}

#[test]
fn test_invalid_filter_patterns() {
    let invalid = ["0x1ab1", "0x1ab1:0x", "vendor:product", "0x1:0x2:0x3", "0x10000:*"];
    for pattern in invalid {
        assert!(
            pattern.parse::<DeviceFilter>().is_err(),
            "{:?} should be rejected",
            pattern
        );
    }
}

#[test]
fn test_wrong_types_rejected() {
    let config = r#"
[usb]
timeout_ms = "fast"
"#;
    let parsed: toml::Value = toml::from_str(config).unwrap();
    assert!(parsed["usb"]["timeout_ms"].as_integer().is_none());
}

#[test]
fn test_malformed_toml_rejected() {
    let incomplete = r#"
[general
log_level = "info"
"#;
    let parsed: Result<toml::Value, _> = toml::from_str(incomplete);
    assert!(parsed.is_err());
}
