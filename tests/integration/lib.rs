//! Shared fixtures for the end-to-end tests.

use std::sync::Once;

use sesame_client::{AttributeSet, Schema};
use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once per test binary.
///
/// Output is captured per test; set `RUST_LOG=sesame=debug` to see traffic.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// The schema of the mock's seeded items.
pub fn schema() -> Schema {
    sesame_mock::mock_schema().unwrap()
}

/// Attributes of a seeded (or new) item.
pub fn item(number: i64, string: &str, even: bool) -> AttributeSet {
    AttributeSet::new()
        .with("number", number)
        .with("string", string)
        .with("even", even)
}
