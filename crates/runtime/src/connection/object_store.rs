//! Identifier-keyed registry of live object proxies.
//!
//! Entries are weak: the registry never keeps a proxy alive. A proxy deregisters
//! itself when its last handle is dropped, and only if it is still the registered
//! instance for its identifier.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::remote_object::RemoteObject;

/// Outcome of [`ObjectStore::insert`].
pub enum Registration {
	/// The object is now registered.
	Inserted,
	/// A live proxy already holds the identifier; it is returned instead.
	Existing(Arc<dyn RemoteObject>),
}

/// Thread-safe registry of protocol objects by identifier.
#[derive(Default)]
pub struct ObjectStore {
	objects: DashMap<Arc<str>, Weak<dyn RemoteObject>>,
}

impl ObjectStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `object` unless a live proxy already holds `identifier`.
	///
	/// An entry whose proxy is already dead is replaced.
	pub fn insert(&self, identifier: Arc<str>, object: &Arc<dyn RemoteObject>) -> Registration {
		match self.objects.entry(identifier) {
			Entry::Occupied(mut entry) => match entry.get().upgrade() {
				Some(existing) => Registration::Existing(existing),
				None => {
					entry.insert(Arc::downgrade(object));
					Registration::Inserted
				}
			},
			Entry::Vacant(entry) => {
				entry.insert(Arc::downgrade(object));
				Registration::Inserted
			}
		}
	}

	/// Returns the live proxy for `identifier`.
	pub fn get(&self, identifier: &str) -> Option<Arc<dyn RemoteObject>> {
		// Upgrade outside the shard lock: a failed upgrade races with the proxy's own
		// drop, which takes the same lock to deregister.
		let weak = self.objects.get(identifier).map(|r| r.value().clone())?;
		weak.upgrade()
	}

	/// Removes `identifier` if it is still registered to `expected`.
	///
	/// Returns false for a stale release: unknown identifier or another proxy.
	pub fn remove_if(&self, identifier: &str, expected: &dyn RemoteObject) -> bool {
		let expected = expected as *const dyn RemoteObject;
		self.objects
			.remove_if(identifier, |_, registered| {
				std::ptr::addr_eq(registered.as_ptr(), expected)
			})
			.is_some()
	}

	pub fn contains(&self, identifier: &str) -> bool {
		self.get(identifier).is_some()
	}

	/// Number of registered identifiers, including entries whose proxy is being dropped.
	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}

	pub fn identifiers(&self) -> Vec<Arc<str>> {
		self.objects.iter().map(|r| r.key().clone()).collect()
	}

	pub fn clear(&self) {
		self.objects.clear();
	}
}
