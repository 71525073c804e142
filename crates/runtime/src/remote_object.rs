//! RemoteObject - the connection-facing side of an object proxy.
//!
//! The connection only knows objects through this trait: it routes `OBJECT_RESET`,
//! `ROOT` data and `EMIT` to them by identifier, and tracks them weakly so a proxy
//! lives exactly as long as the handles the application holds.

use downcast_rs::{DowncastSync, impl_downcast};
use serde_json::{Map, Value};

/// Private module for the sealed trait pattern.
pub mod private {
	/// Marker trait that seals `RemoteObject`.
	pub trait Sealed {}
}

/// A local proxy for an object owned by the peer.
///
/// This trait is sealed; proxies are built by the qbridge crates through an
/// [`ObjectFactory`](crate::ObjectFactory).
pub trait RemoteObject: private::Sealed + DowncastSync {
	/// Returns the wire identifier for this object.
	fn identifier(&self) -> &str;

	/// Returns the name of the object's type.
	fn type_name(&self) -> &str;

	/// Replaces the object's property snapshot.
	fn object_found(&self, data: Map<String, Value>);

	/// Delivers a signal emitted by the peer.
	fn method_invoked(&self, method: &str, parameters: Vec<Value>);
}

impl_downcast!(sync RemoteObject);
