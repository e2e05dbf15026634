//! Environment variable handling.

use std::env;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
pub fn get_var_or(name: &str, default: &str) -> String {
    get_var(name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable as a boolean.
pub fn get_bool(name: &str) -> Option<bool> {
    get_var(name).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// Get an environment variable as a u64.
pub fn get_u64(name: &str) -> Option<u64> {
    get_var(name).and_then(|v| v.parse().ok())
}

/// Environment variable names understood by sesame.
pub mod vars {
    /// Address of the secret service endpoint, e.g. `unix:path=/run/user/1000/sesame/bus`.
    pub const SESAME_SERVICE_ADDRESS: &str = "SESAME_SERVICE_ADDRESS";

    /// Client config file override.
    pub const SESAME_CONFIG: &str = "SESAME_CONFIG";

    /// Per-call timeout in milliseconds.
    pub const SESAME_CALL_TIMEOUT_MS: &str = "SESAME_CALL_TIMEOUT_MS";

    /// Allow falling back to an unencrypted session.
    pub const SESAME_ALLOW_PLAIN_FALLBACK: &str = "SESAME_ALLOW_PLAIN_FALLBACK";

    /// Per-user runtime directory.
    pub const XDG_RUNTIME_DIR: &str = "XDG_RUNTIME_DIR";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_bool() {
        env::set_var("SESAME_TEST_BOOL_TRUE", "true");
        env::set_var("SESAME_TEST_BOOL_1", "1");
        env::set_var("SESAME_TEST_BOOL_FALSE", "false");
        env::set_var("SESAME_TEST_BOOL_0", "0");

        assert_eq!(get_bool("SESAME_TEST_BOOL_TRUE"), Some(true));
        assert_eq!(get_bool("SESAME_TEST_BOOL_1"), Some(true));
        assert_eq!(get_bool("SESAME_TEST_BOOL_FALSE"), Some(false));
        assert_eq!(get_bool("SESAME_TEST_BOOL_0"), Some(false));
        assert_eq!(get_bool("SESAME_TEST_BOOL_NONEXISTENT"), None);
    }

    #[test]
    fn test_get_u64() {
        env::set_var("SESAME_TEST_U64", "2500");
        env::set_var("SESAME_TEST_U64_BAD", "soon");
        assert_eq!(get_u64("SESAME_TEST_U64"), Some(2500));
        assert_eq!(get_u64("SESAME_TEST_U64_BAD"), None);
    }

    #[test]
    fn test_empty_var_is_unset() {
        env::set_var("SESAME_TEST_EMPTY", "");
        assert_eq!(get_var("SESAME_TEST_EMPTY"), None);
        assert_eq!(get_var_or("SESAME_TEST_EMPTY", "fallback"), "fallback");
    }
}
