//! qbridge: live mirrors of objects and lists owned by a backend process
//!
//! A backend owns a tree of objects and lists; this crate keeps a synchronized view of
//! them over a framed JSON byte stream. Objects are built at runtime from type
//! descriptors the backend sends, so no bindings are generated ahead of time.
//!
//! # Examples
//!
//! ## Reading the root object
//!
//! ```ignore
//! use qbridge::{Client, ClientOptions};
//! use qbridge::runtime::PipeTransport;
//!
//! let transport = PipeTransport::new(child_stdin, child_stdout)?;
//! let client = Client::new(Box::new(transport), ClientOptions::default())?;
//!
//! let root = client.root()?;
//! println!("title = {}", root.property("title")?);
//!
//! let _sub = root.on_property_changed("title", |title| {
//!     println!("title is now {title}");
//!     Ok(())
//! })?;
//! root.set_property("title", "Hello")?;
//! client.run()?;
//! ```
//!
//! ## Lists
//!
//! ```ignore
//! let people = root.property("people")?;
//! let model = people.as_object().unwrap().as_model()?;
//! for row in 0..model.row_count()? {
//!     println!("{:?}", model.data(row, "name")?);
//! }
//! ```
//!
//! # Threading
//!
//! The connection is cooperative: handlers run on whichever thread pumps it
//! ([`Client::process_events`], [`Client::poll`], [`Client::run`]) or blocks in a
//! synchronous read. Use one thread at a time.

pub mod client;
pub mod factory;
pub mod handlers;
pub mod model;
pub mod object;
pub mod options;
pub mod schema;
pub mod variant;

pub use client::Client;
pub use factory::ObjectBuilder;
pub use handlers::{HandlerId, Subscription};
pub use model::{ListEvent, ListModel};
pub use object::Object;
pub use options::{ClientOptions, ListOptions};
pub use qbridge_protocol::TypeDescriptor;
pub use qbridge_runtime as runtime;
pub use qbridge_runtime::{Connection, ConnectionOptions, Error, Result};
pub use schema::{Member, Parameter, Property, Schema, SchemaRegistry, ValueKind};
pub use variant::Variant;
