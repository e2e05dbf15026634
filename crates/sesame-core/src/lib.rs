//! # sesame-core
//!
//! Core types shared by every sesame crate.
//!
//! - **Schemas**: named, typed contracts for which attributes an item may carry
//! - **Attributes**: typed attribute sets and the codec to and from the wire map
//! - **Secrets**: zeroizing secret values with redacted formatting
//! - **Configuration**: client settings loaded from JSON5 and the environment

pub mod attributes;
pub mod config;
pub mod env;
pub mod error;
pub mod paths;
pub mod schema;
pub mod secret;

pub use attributes::{AttributeSet, AttributeValue, WireAttributes};
pub use config::ClientConfig;
pub use error::{ConfigError, Error, Result, ValidationError};
pub use schema::{AttributeType, Schema, SchemaFlags};
pub use secret::SecretValue;
