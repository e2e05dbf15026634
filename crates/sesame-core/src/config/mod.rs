//! Client configuration loading and management.

mod address;
mod loader;
mod schema;

pub use address::*;
pub use schema::*;
