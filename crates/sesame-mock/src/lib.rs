//! # sesame-mock
//!
//! A Secret Service double for tests. It speaks the same protocol as a real
//! service and starts from a small fixture:
//!
//! | collection   | alias     | locked | items (number, string, even → secret)        |
//! |--------------|-----------|--------|----------------------------------------------|
//! | `collection` | `default` | no     | 1 one false → 111, 2 two true → 222, 3 three false → 333 |
//! | `second`     |           | yes    | the same three items                         |
//!
//! Every seeded item carries `xdg:schema = org.mock.Schema`.
//!
//! Services can run on a unix socket ([`MockService::start`], or [`start`]
//! to register them by name) or over an in-memory pipe ([`MockService::pair`]).

mod handlers;
pub mod service;
pub mod state;

use std::collections::HashMap;
use std::io;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use sesame_core::schema::{AttributeType, Schema, SchemaFlags};
use sesame_core::{ClientConfig, ValidationError};

pub use service::{MockHandle, MockService};
pub use state::{collection_path, MockState, DEFAULT_COLLECTION, LOCKED_COLLECTION, MOCK_SCHEMA, PATH_PREFIX};

static RUNNING: Lazy<Mutex<HashMap<String, MockService>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Start a seeded service registered under `name` and return a client
/// configuration for it.
///
/// Starting a name that is already running returns the running service.
pub fn start(name: &str) -> io::Result<(ClientConfig, MockHandle)> {
    let mut running = RUNNING.lock();
    if let Some(service) = running.get(name) {
        return Ok((service.config(), service.handle().clone()));
    }
    let service = MockService::start(name)?;
    let started = (service.config(), service.handle().clone());
    running.insert(name.to_string(), service);
    Ok(started)
}

/// Stop the service registered under `name`. `false` if none was running.
pub fn stop(name: &str) -> bool {
    let service = RUNNING.lock().remove(name);
    match service {
        Some(service) => {
            service.stop();
            true
        }
        None => false,
    }
}

/// The schema the fixture's items follow.
pub fn mock_schema() -> Result<Schema, ValidationError> {
    Schema::builder(MOCK_SCHEMA)
        .flags(SchemaFlags::NONE)
        .attribute("number", AttributeType::Integer)
        .attribute("string", AttributeType::String)
        .attribute("even", AttributeType::Boolean)
        .build()
}
