//! `qbridge watch`: stream root changes until the backend exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use qbridge::{ClientOptions, Connection, Object, Subscription, Variant};
use serde::Serialize;
use serde_json::{Value, json};

use crate::cli::BackendArgs;
use crate::error::Result;
use crate::output::{OutputFormat, print_event};
use crate::session::with_client;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchSummary {
	pub events: usize,
	pub limit_reached: bool,
}

/// Counts printed events and closes the connection at the limit.
struct EventSink {
	format: OutputFormat,
	count: AtomicUsize,
	limit: Option<usize>,
	connection: std::sync::Weak<Connection>,
}

impl EventSink {
	fn record(&self, event: Value) {
		if self.limit.is_some_and(|limit| self.count.load(Ordering::SeqCst) >= limit) {
			return;
		}
		print_event(&event, self.format);
		let seen = self.count.fetch_add(1, Ordering::SeqCst) + 1;
		if self.limit.is_some_and(|limit| seen >= limit) {
			tracing::info!(events = seen, "Event limit reached");
			if let Some(connection) = self.connection.upgrade() {
				connection.close();
			}
		}
	}

	fn limit_reached(&self) -> bool {
		self.limit
			.is_some_and(|limit| self.count.load(Ordering::SeqCst) >= limit)
	}
}

pub async fn run(
	backend: &BackendArgs,
	options: ClientOptions,
	max_events: Option<usize>,
	format: OutputFormat,
) -> Result<WatchSummary> {
	with_client(backend, options, move |client| {
		let root = client.root()?;
		let sink = Arc::new(EventSink {
			format,
			count: AtomicUsize::new(0),
			limit: max_events,
			connection: Arc::downgrade(client.connection()),
		});

		let subscriptions = subscribe_all(&root, &sink)?;
		tracing::info!(
			root = %root.type_name(),
			listeners = subscriptions.len(),
			"Watching root object"
		);
		if !sink.limit_reached() {
			client.run()?;
		}
		drop(subscriptions);

		Ok(WatchSummary {
			events: sink.count.load(Ordering::SeqCst),
			limit_reached: sink.limit_reached(),
		})
	})
	.await
}

/// Listens to every property and every signal that is not a change notification.
fn subscribe_all(root: &Object, sink: &Arc<EventSink>) -> Result<Vec<Subscription>> {
	let schema = Arc::clone(root.schema());
	let mut subscriptions = Vec::new();

	for property in schema.properties() {
		let sink = Arc::clone(sink);
		let name = property.name.clone();
		subscriptions.push(root.on_property_changed(&property.name, move |value| {
			sink.record(json!({"kind": "property", "name": name, "value": value.to_wire()}));
			Ok(())
		})?);
	}

	for signal in schema.signals() {
		if schema.property_for_change_signal(&signal.name).is_some() {
			continue;
		}
		let sink = Arc::clone(sink);
		let name = signal.name.clone();
		subscriptions.push(root.connect(&signal.name, move |args| {
			let args: Vec<Value> = args.iter().map(Variant::to_wire).collect();
			sink.record(json!({"kind": "signal", "name": name, "args": args}));
			Ok(())
		})?);
	}
	Ok(subscriptions)
}
