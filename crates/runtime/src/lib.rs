//! qbridge runtime - connection, registry, and transports
//!
//! This crate drives one connection to a backend process that owns a tree of
//! objects:
//!
//! - **Transport**: a reliable byte stream ([`PipeTransport`] over tokio streams, or
//!   the in-memory [`testing`] transport)
//! - **Connection**: framing, the `VERSION` / `CREATABLE_TYPES` / host-ready
//!   handshake, the pending queue and re-entrant synchronous waits
//! - **Object registry**: at most one live proxy per identifier, `OBJECT_REF` on first
//!   sight and `OBJECT_DEREF` when the last handle goes away
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   qbridge   │  Objects, schemas, list models
//! └──────┬──────┘
//!        │ implements ObjectFactory + RemoteObject
//! ┌──────▼──────────┐
//! │ qbridge-runtime │  This crate
//! │  ┌───────────┐  │
//! │  │ Conn      │  │  Handshake, dispatch, waits
//! │  └───────────┘  │
//! │  ┌───────────┐  │
//! │  │ Transport │  │  Pipe / in-memory
//! │  └───────────┘  │
//! └─────────────────┘
//! ```
//!
//! # Decoupling via ObjectFactory
//!
//! The `Connection` builds proxies through the `ObjectFactory` trait and talks to them
//! through `RemoteObject`, so this crate never depends on the proxy implementation.

pub mod channel;
pub mod connection;
pub mod error;
pub mod options;
pub mod remote_object;
pub mod testing;
pub mod transport;

pub use channel::Channel;
pub use connection::{
	Connection, ConnectionState, ObjectFactory, ObjectStore, ROOT_IDENTIFIER, Registration,
};
pub use error::{Error, Result};
pub use options::ConnectionOptions;
pub use qbridge_protocol as protocol;
pub use remote_object::RemoteObject;
pub use transport::{PipeTransport, Transport};
