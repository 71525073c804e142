//! Channel - outbound command proxy for a remote object.

use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::remote_object::RemoteObject;

/// Sends commands to the peer on behalf of one object.
///
/// The channel holds its connection weakly, so objects never keep a closed
/// connection alive.
#[derive(Clone)]
pub struct Channel {
	identifier: Arc<str>,
	connection: Weak<Connection>,
}

impl Channel {
	pub fn new(identifier: Arc<str>, connection: &Arc<Connection>) -> Self {
		Self {
			identifier,
			connection: Arc::downgrade(connection),
		}
	}

	/// Returns the identifier this channel addresses.
	pub fn identifier(&self) -> &str {
		&self.identifier
	}

	/// Returns the connection, or [`Error::ConnectionClosed`] if it is gone.
	pub fn connection(&self) -> Result<Arc<Connection>> {
		self.connection
			.upgrade()
			.ok_or_else(|| Error::ConnectionClosed("connection dropped".to_string()))
	}

	/// Sends `INVOKE`. Fire-and-forget.
	pub fn invoke(&self, method: &str, parameters: Vec<Value>) -> Result<()> {
		self.connection()?
			.invoke_method(&self.identifier, method, parameters)
	}

	/// Sends `OBJECT_QUERY`, optionally blocking until the matching reset is applied.
	pub fn reset(&self, synchronous: bool) -> Result<()> {
		self.connection()?
			.reset_object_data(&self.identifier, synchronous)
	}

	/// Deregisters `object`, sending `OBJECT_DEREF` if it is still the registered proxy.
	///
	/// Called when the last handle to a proxy is dropped; a dropped connection is not
	/// an error here.
	pub fn release(&self, object: &dyn RemoteObject) {
		let Some(connection) = self.connection.upgrade() else {
			return;
		};
		if let Err(e) = connection.remove_object(&self.identifier, object) {
			tracing::debug!(identifier = %self.identifier, error = %e, "Release failed");
		}
	}
}

impl std::fmt::Debug for Channel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Channel")
			.field("identifier", &self.identifier)
			.finish_non_exhaustive()
	}
}
