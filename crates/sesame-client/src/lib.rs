//! # sesame-client
//!
//! Store, look up and remove secrets held by a Secret Service.
//!
//! Items are addressed by attribute sets checked against a [`Schema`].
//! Secret values travel over a transport session that is encrypted unless
//! configured otherwise.
//!
//! Every operation exists once, as an async method on [`SecretService`].
//! [`Dispatcher`] offers the same operations as blocking calls and as calls
//! that report through a callback, for code that does not run an executor.
//!
//! ```no_run
//! use sesame_client::{AttributeSet, Dispatcher, SecretValue};
//! use sesame_core::schema;
//!
//! # fn main() -> sesame_client::Result<()> {
//! let dispatcher = Dispatcher::connect_default()?;
//! let note = schema::note();
//! let attributes = AttributeSet::new();
//!
//! dispatcher.store_sync(&note, &attributes, None, "Shopping list", &SecretValue::text("eggs"), true)?;
//! let value = dispatcher.lookup_sync(&note, &attributes)?;
//! assert_eq!(value.and_then(|v| v.as_text().map(str::to_string)).as_deref(), Some("eggs"));
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod item;
mod operations;
mod prompt;
pub mod resolver;
pub mod service;

pub use dispatch::{Dispatcher, OperationState, PendingOperation};
pub use error::{Error, Result};
pub use item::{Item, SearchFlags};
pub use resolver::DEFAULT_ALIAS;
pub use service::SecretService;

pub use sesame_core::{AttributeSet, AttributeValue, ClientConfig, Schema, SchemaFlags, SecretValue};
pub use sesame_rpc::RemoteErrorKind;
