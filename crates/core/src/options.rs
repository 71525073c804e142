//! Client configuration.

use qbridge_runtime::ConnectionOptions;
use serde::{Deserialize, Serialize};

/// Default number of rows kept by a windowed list.
pub const DEFAULT_CACHE_SIZE: usize = 500;

/// Options for list models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListOptions {
	/// Rows the peer pushes per batch. Zero lets the peer push every row.
	pub batch_size: usize,
	/// Maximum rows a windowed list keeps cached. Never below `batch_size`.
	pub cache_size: usize,
}

impl Default for ListOptions {
	fn default() -> Self {
		Self {
			batch_size: 0,
			cache_size: DEFAULT_CACHE_SIZE,
		}
	}
}

impl ListOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn batch_size(mut self, batch_size: usize) -> Self {
		self.batch_size = batch_size;
		self
	}

	pub fn cache_size(mut self, cache_size: usize) -> Self {
		self.cache_size = cache_size;
		self
	}

	/// The cache size actually used: at least one batch, and at least one row.
	pub fn effective_cache_size(&self) -> usize {
		self.cache_size.max(self.batch_size).max(1)
	}
}

/// Options for a [`Client`](crate::Client).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOptions {
	pub connection: ConnectionOptions,
	pub list: ListOptions,
}

impl ClientOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn connection(mut self, connection: ConnectionOptions) -> Self {
		self.connection = connection;
		self
	}

	pub fn list(mut self, list: ListOptions) -> Self {
		self.list = list;
		self
	}
}
