//! Client configuration save/load roundtrip tests.

use std::path::Path;

use sesame_core::config::{ServiceAddress, SessionAlgorithmPreference};
use sesame_core::ClientConfig;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("client.json5");

    let config = ClientConfig::default();
    config.save(&path).unwrap();

    let loaded = ClientConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.default_collection, "default");
    assert_eq!(loaded.session.algorithm, SessionAlgorithmPreference::Aes);
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("client.json5");

    let mut config = ClientConfig::default();
    config.address = Some("unix:path=/tmp/sesame/bus".to_string());
    config.call_timeout_ms = Some(2500);
    config.session.allow_plain_fallback = true;
    config.save(&path).unwrap();

    let loaded = ClientConfig::load(&path).unwrap();
    assert_eq!(loaded.call_timeout_ms, Some(2500));
    assert!(loaded.session.allow_plain_fallback);
    assert_eq!(
        loaded.service_address().unwrap(),
        ServiceAddress::Unix("/tmp/sesame/bus".into())
    );
}

#[test]
fn test_config_parses_json5() {
    let config = ClientConfig::parse(
        r#"{
            // comments and trailing commas are fine
            session: { algorithm: "plain" },
            default_collection: "login",
        }"#,
    )
    .unwrap();
    assert_eq!(config.session.algorithm, SessionAlgorithmPreference::Plain);
    assert_eq!(config.default_collection, "login");
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_load_nonexistent() {
    let result = ClientConfig::load(Path::new("/nonexistent/client.json5"));
    assert!(result.is_err());
}

#[test]
fn test_config_parse_invalid() {
    assert!(ClientConfig::parse("not valid json").is_err());
}

#[test]
fn test_config_validation_collects_errors() {
    let mut config = ClientConfig::default();
    config.address = Some("tcp:host=localhost".to_string());
    config.call_timeout_ms = Some(0);
    config.default_collection = "/org/freedesktop/secrets/collection/login".to_string();

    let message = config.validate().unwrap_err().to_string();
    assert!(message.contains("call_timeout_ms"));
    assert!(message.contains("default_collection"));
    assert!(message.contains("tcp:host=localhost"));
}
