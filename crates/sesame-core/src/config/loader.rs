//! Configuration loading and persistence.

use super::{ClientConfig, ServiceAddress};
use crate::env;
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::Path;

impl ClientConfig {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Load configuration from the default path, falling back to defaults if
    /// no file exists, then apply environment overrides.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let mut config = match Self::load_default() {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(e) => return Err(e),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        // json5 doesn't have a serializer, so we use serde_json with pretty print
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Override settings from `SESAME_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Some(address) = env::get_var(env::vars::SESAME_SERVICE_ADDRESS) {
            self.address = Some(address);
        }
        if let Some(timeout) = env::get_u64(env::vars::SESAME_CALL_TIMEOUT_MS) {
            self.call_timeout_ms = Some(timeout);
        }
        if let Some(allow) = env::get_bool(env::vars::SESAME_ALLOW_PLAIN_FALLBACK) {
            self.session.allow_plain_fallback = allow;
        }
    }

    /// Resolve the service endpoint: the configured address, or the one
    /// discovered from the environment.
    pub fn service_address(&self) -> Result<ServiceAddress, ConfigError> {
        match &self.address {
            Some(address) => address.parse(),
            None => ServiceAddress::from_env(),
        }
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if let Some(address) = &self.address {
            if let Err(e) = address.parse::<ServiceAddress>() {
                errors.push(e.to_string());
            }
        }

        if self.call_timeout_ms == Some(0) {
            errors.push("call_timeout_ms must be greater than 0".to_string());
        }

        if self.default_collection.is_empty() {
            errors.push("default_collection must not be empty".to_string());
        } else if self.default_collection.contains('/') {
            errors.push(format!(
                "default_collection '{}' must be an alias, not an object path",
                self.default_collection
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionAlgorithmPreference;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let content = r#"{
            // comments are fine in JSON5
            address: "unix:path=/tmp/sesame.sock",
            session: { allow_plain_fallback: true },
        }"#;

        let config = ClientConfig::parse(content).unwrap();
        assert_eq!(config.address.as_deref(), Some("unix:path=/tmp/sesame.sock"));
        assert!(config.session.allow_plain_fallback);
        assert_eq!(config.session.algorithm, SessionAlgorithmPreference::Aes);
        assert_eq!(config.default_collection, "default");
    }

    #[test]
    fn test_parse_plain_algorithm() {
        let config = ClientConfig::parse(r#"{ session: { algorithm: "plain" } }"#).unwrap();
        assert_eq!(config.session.algorithm, SessionAlgorithmPreference::Plain);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            ClientConfig::parse("not valid json"),
            Err(ConfigError::Json5(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("client.json5");

        let mut config = ClientConfig::default();
        config.call_timeout_ms = Some(1500);
        config.default_collection = "login".to_string();
        config.save(&path).unwrap();

        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.call_timeout().map(|d| d.as_millis()), Some(1500));
    }

    #[test]
    fn test_load_nonexistent() {
        let result = ClientConfig::load(Path::new("/nonexistent/client.json5"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_validate_default_config() {
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = ClientConfig {
            address: Some("tcp:host=example".to_string()),
            call_timeout_ms: Some(0),
            default_collection: "/org/freedesktop/secrets/collection/login".to_string(),
            ..ClientConfig::default()
        };

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("unsupported transport"), "{err}");
        assert!(err.contains("call_timeout_ms"), "{err}");
        assert!(err.contains("must be an alias"), "{err}");
    }

    #[test]
    fn test_service_address_from_config() {
        let config = ClientConfig {
            address: Some("unix:path=/tmp/explicit.sock".to_string()),
            ..ClientConfig::default()
        };
        assert_eq!(
            config.service_address().unwrap(),
            ServiceAddress::Unix("/tmp/explicit.sock".into())
        );
    }
}
