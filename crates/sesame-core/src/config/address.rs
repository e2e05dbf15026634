//! Service endpoint addresses.
//!
//! Addresses follow the bus convention `transport:key=value,...`. Only the
//! `unix` transport with a `path` key is supported.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::env;
use crate::error::ConfigError;
use crate::paths;

/// A parsed service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAddress {
    /// A unix domain socket path.
    Unix(PathBuf),
}

impl ServiceAddress {
    /// Discover the endpoint from the environment.
    ///
    /// Uses `SESAME_SERVICE_ADDRESS` when set, otherwise the default socket
    /// under the user's runtime directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::get_var(env::vars::SESAME_SERVICE_ADDRESS) {
            Some(address) => address.parse(),
            None => Ok(Self::Unix(paths::default_service_socket())),
        }
    }
}

impl FromStr for ServiceAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidAddress(format!("{s}: {reason}"));

        let (transport, params) = s.split_once(':').ok_or_else(|| invalid("missing transport"))?;
        if transport != "unix" {
            return Err(invalid("unsupported transport"));
        }

        let mut path = None;
        for pair in params.split(',').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| invalid("malformed key=value"))?;
            if key == "path" {
                path = Some(PathBuf::from(value));
            }
        }

        match path {
            Some(path) if !path.as_os_str().is_empty() => Ok(Self::Unix(path)),
            _ => Err(invalid("missing path")),
        }
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:path={}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unix_address() {
        let address: ServiceAddress = "unix:path=/run/user/1000/sesame/bus".parse().unwrap();
        assert_eq!(address, ServiceAddress::Unix(PathBuf::from("/run/user/1000/sesame/bus")));
        assert_eq!(address.to_string(), "unix:path=/run/user/1000/sesame/bus");
    }

    #[test]
    fn test_parse_ignores_unknown_keys() {
        let address: ServiceAddress = "unix:guid=abc,path=/tmp/bus".parse().unwrap();
        assert_eq!(address, ServiceAddress::Unix(PathBuf::from("/tmp/bus")));
    }

    #[test]
    fn test_parse_rejects_bad_addresses() {
        for bad in ["", "unix", "tcp:host=localhost", "unix:path=", "unix:abstract=/tmp/x", "unix:path"] {
            assert!(bad.parse::<ServiceAddress>().is_err(), "{bad} should not parse");
        }
    }
}
