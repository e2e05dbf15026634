//! Path resolution utilities.

use crate::env;
use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the sesame config directory (`~/.config/sesame` on Linux).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let base = dirs::config_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine config directory".to_string())
    })?;
    Ok(base.join("sesame"))
}

/// Get the client config file path, honouring `SESAME_CONFIG`.
pub fn config_file() -> Result<PathBuf, ConfigError> {
    if let Some(path) = env::get_var(env::vars::SESAME_CONFIG) {
        return Ok(expand_tilde(&path));
    }
    Ok(config_dir()?.join("client.json5"))
}

/// Get the per-user runtime directory.
///
/// Falls back to the system temp directory when `XDG_RUNTIME_DIR` is unset.
pub fn runtime_dir() -> PathBuf {
    env::get_var(env::vars::XDG_RUNTIME_DIR)
        .map(PathBuf::from)
        .or_else(dirs::runtime_dir)
        .unwrap_or_else(std::env::temp_dir)
}

/// Default socket path of the secret service endpoint.
pub fn default_service_socket() -> PathBuf {
    runtime_dir().join("sesame").join("bus")
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir() {
        if let Ok(dir) = config_dir() {
            assert!(dir.ends_with("sesame"));
        }
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/test");
        assert!(!expanded.to_string_lossy().contains('~'));
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn test_default_service_socket() {
        let socket = default_service_socket();
        assert!(socket.ends_with("sesame/bus"));
    }
}
