//! Handler registries shared by objects and lists.
//!
//! Property, signal and list handlers all live in a [`HandlerMap`] keyed by
//! [`HandlerId`]. The map preserves registration order, which is the order
//! handlers run in, and removal keeps that order intact.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use qbridge_runtime::Result;

/// Identifies one registered handler.
pub type HandlerId = u64;

static HANDLER_IDS: AtomicU64 = AtomicU64::new(1);

/// Callback invoked with an event payload.
///
/// Handlers run on the thread pumping the connection and may block in nested
/// waits (reading a property, fetching rows).
pub type HandlerFn<E> = Arc<dyn Fn(E) -> Result<()> + Send + Sync>;

/// A registered handler and the name it listens to.
///
/// `M` is the filter key: a signal or property name for objects, `()` for lists.
pub struct HandlerEntry<E, M = ()> {
	pub meta: M,
	pub handler: HandlerFn<E>,
}

/// Shared, ordered handler storage.
pub type HandlerMap<E, M = ()> = Arc<Mutex<IndexMap<HandlerId, HandlerEntry<E, M>>>>;

pub fn handler_map<E, M>() -> HandlerMap<E, M> {
	Arc::new(Mutex::new(IndexMap::new()))
}

/// Adds `handler` to `handlers`, returning the guard that removes it again.
pub fn register<E, M>(handlers: &HandlerMap<E, M>, meta: M, handler: HandlerFn<E>) -> Subscription
where
	E: Send + Sync + 'static,
	M: Send + Sync + 'static,
{
	let id = HANDLER_IDS.fetch_add(1, Ordering::Relaxed);
	handlers.lock().insert(id, HandlerEntry { meta, handler });

	let map: Weak<Mutex<IndexMap<HandlerId, HandlerEntry<E, M>>>> = Arc::downgrade(handlers);
	Subscription {
		id,
		detach: Some(Box::new(move || {
			if let Some(map) = map.upgrade() {
				map.lock().shift_remove(&id);
			}
		})),
	}
}

/// Runs each handler whose key passes `filter` with a clone of `event`.
///
/// Handlers are collected before any runs, so one may register or drop
/// subscriptions from inside its callback. A failing handler is logged and the
/// rest still run.
pub fn dispatch<E, M>(handlers: &HandlerMap<E, M>, filter: impl Fn(&M) -> bool, event: E, kind: &str)
where
	E: Clone,
{
	let targets: Vec<(HandlerId, HandlerFn<E>)> = handlers
		.lock()
		.iter()
		.filter(|(_, entry)| filter(&entry.meta))
		.map(|(id, entry)| (*id, Arc::clone(&entry.handler)))
		.collect();

	for (handler_id, handler) in targets {
		if let Err(error) = handler(event.clone()) {
			tracing::error!(%error, handler_id, kind, "Handler failed");
		}
	}
}

/// Keeps a handler registered for as long as it lives.
///
/// Only a weak link to the registry is held: dropping the guard after its
/// object or list is gone does nothing.
pub struct Subscription {
	id: HandlerId,
	detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Removes the handler now instead of at drop.
	pub fn unsubscribe(mut self) {
		self.detach();
	}

	fn detach(&mut self) {
		if let Some(detach) = self.detach.take() {
			detach();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.detach();
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("attached", &self.detach.is_some())
			.finish()
	}
}
