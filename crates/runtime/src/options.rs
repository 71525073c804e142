//! Connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default timeout for synchronous waits, in milliseconds.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5000;

/// Options for a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionOptions {
	/// Maximum time a synchronous wait blocks before the connection fails.
	pub wait_timeout_ms: u64,

	/// Whether the host is ready when the handshake completes.
	///
	/// When false the connection stays in the host-ready state until
	/// [`Connection::set_host_ready`](crate::Connection::set_host_ready) is called.
	pub host_ready: bool,
}

impl Default for ConnectionOptions {
	fn default() -> Self {
		Self {
			wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
			host_ready: true,
		}
	}
}

impl ConnectionOptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the synchronous wait timeout.
	pub fn wait_timeout(mut self, timeout: Duration) -> Self {
		self.wait_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
		self
	}

	/// Sets whether the host is ready up front.
	pub fn host_ready(mut self, ready: bool) -> Self {
		self.host_ready = ready;
		self
	}

	pub fn wait_timeout_duration(&self) -> Duration {
		Duration::from_millis(self.wait_timeout_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let options = ConnectionOptions::default();
		assert_eq!(options.wait_timeout_duration(), Duration::from_secs(5));
		assert!(options.host_ready);
	}

	#[test]
	fn test_partial_json() {
		let options: ConnectionOptions =
			serde_json::from_value(serde_json::json!({"waitTimeoutMs": 250})).unwrap();
		assert_eq!(options.wait_timeout_ms, 250);
		assert!(options.host_ready);
	}
}
