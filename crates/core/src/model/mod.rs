//! List models kept in sync with a remote list.
//!
//! A model object carries a companion object in its `_qb_model` property. The
//! companion exposes `roleNames` and `batchSize`, accepts `reset`,
//! `requestRows(start, count)` and `setBatchSize(size)`, and emits the deltas:
//!
//! | Signal | Parameters |
//! |--------|------------|
//! | `modelReset` | `rowData`, `moreRows` |
//! | `modelInsert` | `start`, `rowData`, `moreRows` |
//! | `modelRemove` | `start`, `end` (inclusive) |
//! | `modelMove` | `start`, `end`, `destination` |
//! | `modelUpdate` | `row`, `data` |
//! | `modelRowData` | `start`, `rowData` (answer to `requestRows`) |
//!
//! Each row is an array of values indexed by role position. `moreRows` counts rows
//! that exist but were not pushed; a list with unpushed rows, or any list when a batch
//! size is configured, is kept as a bounded window and fetched on demand.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use qbridge_protocol::message::EMIT;
use qbridge_runtime::{Error, Result};
use serde_json::{Value, json};

use crate::handlers::{self, HandlerMap, Subscription, handler_map};
use crate::object::Object;
use crate::options::ListOptions;
use crate::schema::MODEL_PROPERTY;
use crate::variant::Variant;

mod dense;
mod window;

use dense::DenseRows;
use window::WindowedRows;

const MODEL_RESET: &str = "modelReset";
const MODEL_INSERT: &str = "modelInsert";
const MODEL_REMOVE: &str = "modelRemove";
const MODEL_MOVE: &str = "modelMove";
const MODEL_UPDATE: &str = "modelUpdate";
const MODEL_ROW_DATA: &str = "modelRowData";

const MODEL_SIGNALS: [&str; 6] = [
	MODEL_RESET,
	MODEL_INSERT,
	MODEL_REMOVE,
	MODEL_MOVE,
	MODEL_UPDATE,
	MODEL_ROW_DATA,
];

/// Fetch size for windowed lists when no batch size is configured.
const DEFAULT_FETCH_BATCH: usize = 100;

/// A change applied to a [`ListModel`].
///
/// Ranges are inclusive, matching the wire deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
	Reset { row_count: usize },
	Inserted { start: usize, count: usize },
	Removed { start: usize, end: usize },
	/// `start..=end` moved so that the block begins at `destination` when moving up,
	/// or ends at `destination` when moving down.
	Moved { start: usize, end: usize, destination: usize },
	Updated { row: usize },
	RowsLoaded { start: usize, count: usize },
}

/// A delta that does not fit the current rows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum DeltaError {
	#[error("row {row} out of range for {row_count} rows")]
	OutOfRange { row: usize, row_count: usize },
	#[error("invalid range {start}..={end} for {row_count} rows")]
	InvalidRange { start: usize, end: usize, row_count: usize },
	#[error("argument {index}: {reason}")]
	BadArgument { index: usize, reason: &'static str },
}

pub(crate) type DeltaResult<T> = std::result::Result<T, DeltaError>;

pub(crate) fn check_index(row: usize, row_count: usize) -> DeltaResult<()> {
	if row < row_count {
		Ok(())
	} else {
		Err(DeltaError::OutOfRange { row, row_count })
	}
}

pub(crate) fn check_range(start: usize, end: usize, row_count: usize) -> DeltaResult<()> {
	if start <= end && end < row_count {
		Ok(())
	} else {
		Err(DeltaError::InvalidRange {
			start,
			end,
			row_count,
		})
	}
}

/// Where `row` ends up after moving `start..=end` to `destination`.
///
/// Moving up, the block lands at `destination`. Moving down, its last row lands at
/// `destination`. Rows in between shift to fill the gap.
pub(crate) fn moved_index(row: usize, start: usize, end: usize, destination: usize) -> usize {
	let count = end - start + 1;
	if (start..=end).contains(&row) {
		let offset = row - start;
		if destination < start {
			destination + offset
		} else {
			destination + 1 - count + offset
		}
	} else if destination < start && (destination..start).contains(&row) {
		row + count
	} else if destination > end && row > end && row <= destination {
		row - count
	} else {
		row
	}
}

enum Rows {
	Dense(DenseRows),
	Windowed(WindowedRows),
}

impl Rows {
	fn row_count(&self) -> usize {
		match self {
			Rows::Dense(rows) => rows.len(),
			Rows::Windowed(rows) => rows.row_count(),
		}
	}
}

struct ModelState {
	options: ListOptions,
	rows: Rows,
	/// Whether a `modelReset` has been applied since the last reset request.
	loaded: bool,
}

impl ModelState {
	fn fetch_batch(&self) -> usize {
		if self.options.batch_size > 0 {
			self.options.batch_size
		} else {
			DEFAULT_FETCH_BATCH
		}
	}

	fn cache_size(&self) -> usize {
		self.options.effective_cache_size().max(self.fetch_batch())
	}

	fn windowed(&self) -> WindowedRows {
		WindowedRows::new(self.fetch_batch(), self.cache_size())
	}

	fn apply(&mut self, signal: &str, args: &[Variant]) -> DeltaResult<Option<ListEvent>> {
		Ok(Some(match signal {
			MODEL_RESET => {
				let rows = row_list(args, 0)?;
				let more = index_arg(args, 1)?;
				self.rows = if self.options.batch_size > 0 || more > 0 {
					let mut windowed = self.windowed();
					windowed.reset(rows, more);
					Rows::Windowed(windowed)
				} else {
					Rows::Dense(DenseRows::new(rows))
				};
				self.loaded = true;
				ListEvent::Reset {
					row_count: self.rows.row_count(),
				}
			}
			MODEL_INSERT => {
				let start = index_arg(args, 0)?;
				let rows = row_list(args, 1)?;
				let more = index_arg(args, 2)?;
				// Unpushed rows turn a dense list into a window.
				if more > 0 && matches!(self.rows, Rows::Dense(_)) {
					let (batch, cache) = (self.fetch_batch(), self.cache_size());
					if let Rows::Dense(dense) = std::mem::replace(&mut self.rows, Rows::Dense(DenseRows::default())) {
						self.rows = Rows::Windowed(dense.into_windowed(batch, cache));
					}
				}
				let count = match &mut self.rows {
					Rows::Dense(dense) => {
						let count = rows.len();
						dense.insert(start, rows)?;
						count
					}
					Rows::Windowed(windowed) => windowed.insert(start, rows, more)?,
				};
				if count == 0 {
					return Ok(None);
				}
				ListEvent::Inserted { start, count }
			}
			MODEL_REMOVE => {
				let start = index_arg(args, 0)?;
				let end = index_arg(args, 1)?;
				match &mut self.rows {
					Rows::Dense(dense) => dense.remove(start, end)?,
					Rows::Windowed(windowed) => windowed.remove(start, end)?,
				}
				ListEvent::Removed { start, end }
			}
			MODEL_MOVE => {
				let start = index_arg(args, 0)?;
				let end = index_arg(args, 1)?;
				let destination = index_arg(args, 2)?;
				let moved = match &mut self.rows {
					Rows::Dense(dense) => dense.move_rows(start, end, destination)?,
					Rows::Windowed(windowed) => windowed.move_rows(start, end, destination)?,
				};
				if !moved {
					return Ok(None);
				}
				ListEvent::Moved {
					start,
					end,
					destination,
				}
			}
			MODEL_UPDATE => {
				let row = index_arg(args, 0)?;
				let data = args.get(1).map(Variant::to_wire).unwrap_or(Value::Null);
				match &mut self.rows {
					Rows::Dense(dense) => dense.update(row, data)?,
					Rows::Windowed(windowed) => windowed.update(row, data)?,
				}
				ListEvent::Updated { row }
			}
			MODEL_ROW_DATA => {
				let start = index_arg(args, 0)?;
				let rows = row_list(args, 1)?;
				let count = match &mut self.rows {
					Rows::Dense(dense) => dense.load(start, rows),
					Rows::Windowed(windowed) => windowed.load(start, rows),
				};
				ListEvent::RowsLoaded { start, count }
			}
			_ => return Ok(None),
		}))
	}
}

fn index_arg(args: &[Variant], index: usize) -> DeltaResult<usize> {
	let value = args.get(index).ok_or(DeltaError::BadArgument {
		index,
		reason: "missing",
	})?;
	if value.is_null() {
		return Ok(0);
	}
	value
		.as_i64()
		.and_then(|i| usize::try_from(i).ok())
		.ok_or(DeltaError::BadArgument {
			index,
			reason: "not a row index",
		})
}

fn row_list(args: &[Variant], index: usize) -> DeltaResult<Vec<Value>> {
	match args.get(index).map(Variant::to_wire) {
		Some(Value::Array(rows)) => Ok(rows),
		Some(Value::Null) => Ok(Vec::new()),
		Some(_) => Err(DeltaError::BadArgument {
			index,
			reason: "not a row list",
		}),
		None => Err(DeltaError::BadArgument {
			index,
			reason: "missing",
		}),
	}
}

/// Shared state behind [`ListModel`] handles.
pub(crate) struct ModelShared {
	object: Object,
	companion: Object,
	role_names: Vec<String>,
	state: Mutex<ModelState>,
	handlers: HandlerMap<ListEvent>,
	/// Listeners on the companion's model signals.
	signals: Mutex<Vec<Subscription>>,
}

impl ModelShared {
	fn on_signal(&self, signal: &str, args: Vec<Variant>) -> Result<()> {
		let outcome = {
			let mut state = self.state.lock();
			if !state.loaded && signal != MODEL_RESET {
				tracing::trace!(identifier = %self.object.identifier(), signal, "Ignoring delta before reset");
				return Ok(());
			}
			state.apply(signal, &args)
		};

		match outcome {
			Ok(Some(event)) => {
				tracing::trace!(identifier = %self.object.identifier(), event = ?event, "List changed");
				handlers::dispatch(&self.handlers, |_| true, event, "list");
				Ok(())
			}
			Ok(None) => Ok(()),
			Err(e) => {
				tracing::warn!(identifier = %self.object.identifier(), signal, error = %e, "Invalid list delta, requesting reset");
				self.request_reset()
			}
		}
	}

	fn request_reset(&self) -> Result<()> {
		self.state.lock().loaded = false;
		self.companion.send_invoke("reset", Vec::new())
	}

	/// Blocks until the companion's signal `method` arrives and is handled.
	fn wait_for_signal(&self, method: &'static str) -> Result<()> {
		let connection = self.companion.connection()?;
		let identifier = self.companion.identifier().to_string();
		connection.wait_and_handle(method, move |message| {
			message.command() == EMIT
				&& message.identifier() == Some(identifier.as_str())
				&& message.method() == Some(method)
		})
	}
}

/// Handle to a remote list.
///
/// Clones share one row store. The rows are dropped with the last handle; a later
/// [`Object::as_model`] starts over with a reset.
#[derive(Clone)]
pub struct ListModel {
	shared: Arc<ModelShared>,
}

impl ListModel {
	/// Returns the model for `object`, creating and wiring it on first use.
	pub(crate) fn attach(object: &Object) -> Result<Self> {
		if !object.is_model() {
			return Err(Error::InvalidArgument(format!(
				"{} ({}) is not a list model",
				object.type_name(),
				object.identifier()
			)));
		}
		if let Some(shared) = object.cached_model() {
			return Ok(Self { shared });
		}

		let companion = match object.property(MODEL_PROPERTY)? {
			Variant::Object(companion) => companion,
			other => {
				return Err(Error::MalformedMessage {
					command: "OBJECT_RESET".to_string(),
					reason: format!("{MODEL_PROPERTY} of {} is not an object: {other}", object.identifier()),
				});
			}
		};
		let role_names: Vec<String> = match companion.property("roleNames") {
			Ok(roles) => roles
				.to_wire()
				.as_array()
				.map(|names| names.iter().filter_map(|n| n.as_str().map(str::to_string)).collect())
				.unwrap_or_default(),
			Err(Error::UnknownProperty { .. }) => Vec::new(),
			Err(e) => return Err(e),
		};

		let options = object.list_options();
		let shared = Arc::new_cyclic(|weak: &Weak<ModelShared>| {
			let signals = MODEL_SIGNALS
				.iter()
				.filter_map(|&signal| {
					let weak = weak.clone();
					let subscription = companion.connect(signal, move |args| match weak.upgrade() {
						Some(shared) => shared.on_signal(signal, args),
						None => Ok(()),
					});
					match subscription {
						Ok(subscription) => Some(subscription),
						Err(e) => {
							tracing::debug!(identifier = %companion.identifier(), signal, error = %e, "Model signal unavailable");
							None
						}
					}
				})
				.collect();

			ModelShared {
				object: object.clone(),
				companion: companion.clone(),
				role_names,
				state: Mutex::new(ModelState {
					options,
					rows: Rows::Dense(DenseRows::default()),
					loaded: false,
				}),
				handlers: handler_map(),
				signals: Mutex::new(signals),
			}
		});
		object.cache_model(&shared);

		tracing::debug!(
			identifier = %object.identifier(),
			model = %companion.identifier(),
			roles = shared.role_names.len(),
			batch_size = options.batch_size,
			"Attached list model"
		);
		if options.batch_size > 0 {
			companion.send_invoke("setBatchSize", vec![json!(options.batch_size)])?;
		}
		companion.send_invoke("reset", Vec::new())?;
		Ok(Self { shared })
	}

	/// The model object.
	pub fn object(&self) -> &Object {
		&self.shared.object
	}

	pub fn role_names(&self) -> &[String] {
		&self.shared.role_names
	}

	/// Position of `role` within each row.
	pub fn role_index(&self, role: &str) -> Option<usize> {
		self.shared.role_names.iter().position(|name| name == role)
	}

	/// Number of rows. Blocks for the initial reset.
	pub fn row_count(&self) -> Result<usize> {
		self.ensure_loaded()?;
		Ok(self.shared.state.lock().rows.row_count())
	}

	/// Returns one row, fetching it if the list is windowed and the row is not cached.
	///
	/// Returns `None` for a row past the end.
	pub fn row(&self, row: usize) -> Result<Option<Value>> {
		self.ensure_loaded()?;
		let (start, count) = {
			let mut state = self.shared.state.lock();
			match &mut state.rows {
				Rows::Dense(dense) => return Ok(dense.get(row).cloned()),
				Rows::Windowed(windowed) => {
					if row >= windowed.row_count() {
						return Ok(None);
					}
					windowed.touch(row);
					if let Some(data) = windowed.get(row) {
						return Ok(Some(data.clone()));
					}
					windowed.window_for(row)
				}
			}
		};

		tracing::debug!(identifier = %self.shared.object.identifier(), row, start, count, "Fetching rows");
		self.shared
			.companion
			.send_invoke("requestRows", vec![json!(start), json!(count)])?;
		self.shared.wait_for_signal(MODEL_ROW_DATA)?;

		let mut state = self.shared.state.lock();
		let data = match &mut state.rows {
			Rows::Dense(dense) => dense.get(row).cloned(),
			Rows::Windowed(windowed) => {
				let data = windowed.get(row).cloned();
				windowed.clean(row);
				data
			}
		};
		if data.is_none() {
			tracing::warn!(identifier = %self.shared.object.identifier(), row, "Fetched rows did not include the requested row");
		}
		Ok(data)
	}

	/// The value of `role` in `row`.
	///
	/// Rows are arrays indexed by role position; rows sent as JSON objects are
	/// indexed by role name.
	pub fn data(&self, row: usize, role: &str) -> Result<Option<Value>> {
		let Some(data) = self.row(row)? else {
			return Ok(None);
		};
		Ok(match data {
			Value::Array(values) => self.role_index(role).and_then(|index| values.get(index).cloned()),
			Value::Object(mut map) => map.remove(role),
			_ => None,
		})
	}

	/// Whether rows are fetched on demand.
	pub fn is_windowed(&self) -> bool {
		matches!(self.shared.state.lock().rows, Rows::Windowed(_))
	}

	/// Indices of the rows held locally.
	pub fn cached_rows(&self) -> Vec<usize> {
		match &self.shared.state.lock().rows {
			Rows::Dense(dense) => (0..dense.len()).collect(),
			Rows::Windowed(windowed) => windowed.cached_rows(),
		}
	}

	/// Registers a listener for list changes.
	pub fn subscribe<F>(&self, handler: F) -> Subscription
	where
		F: Fn(ListEvent) -> Result<()> + Send + Sync + 'static,
	{
		handlers::register(&self.shared.handlers, (), Arc::new(handler))
	}

	/// Asks the peer to resend the list. Reads block until the reset arrives.
	pub fn request_reset(&self) -> Result<()> {
		self.shared.request_reset()
	}

	/// Changes how many rows the peer pushes per batch, from the next reset on.
	pub fn set_batch_size(&self, batch_size: usize) -> Result<()> {
		{
			let mut state = self.shared.state.lock();
			state.options.batch_size = batch_size;
			let (batch, cache) = (state.fetch_batch(), state.cache_size());
			if let Rows::Windowed(windowed) = &mut state.rows {
				windowed.set_batch_size(batch);
				windowed.clean(windowed.hint());
			}
			tracing::debug!(batch_size, cache_size = cache, "Batch size changed");
		}
		self.shared
			.companion
			.send_invoke("setBatchSize", vec![json!(batch_size)])
	}

	fn ensure_loaded(&self) -> Result<()> {
		if self.shared.state.lock().loaded {
			return Ok(());
		}
		self.shared.wait_for_signal(MODEL_RESET)
	}
}

impl std::fmt::Debug for ListModel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ListModel")
			.field("object", &self.shared.object.identifier())
			.field("roles", &self.shared.role_names)
			.field("subscriptions", &self.shared.signals.lock().len())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_moved_index_down() {
		// Rows 0..9, block 2..=4 to 7.
		let moved: Vec<usize> = (0..10).map(|row| moved_index(row, 2, 4, 7)).collect();
		assert_eq!(moved, vec![0, 1, 5, 6, 7, 2, 3, 4, 8, 9]);
		assert_eq!(moved_index(7, 2, 4, 7), 4);
	}

	#[test]
	fn test_moved_index_up() {
		// Rows 0..9, block 5..=7 to 1.
		let moved: Vec<usize> = (0..10).map(|row| moved_index(row, 5, 7, 1)).collect();
		assert_eq!(moved, vec![0, 4, 5, 6, 7, 1, 2, 3, 8, 9]);
	}

	#[test]
	fn test_checks() {
		assert!(check_index(2, 3).is_ok());
		assert!(check_index(3, 3).is_err());
		assert!(check_range(0, 2, 3).is_ok());
		assert!(check_range(2, 1, 3).is_err());
		assert!(check_range(1, 3, 3).is_err());
	}

	fn state(batch_size: usize) -> ModelState {
		ModelState {
			options: ListOptions::new().batch_size(batch_size).cache_size(4),
			rows: Rows::Dense(DenseRows::default()),
			loaded: false,
		}
	}

	fn rows(values: &[i64]) -> Variant {
		Variant::Var(Value::Array(values.iter().map(|v| json!([v])).collect()))
	}

	#[test]
	fn test_reset_picks_store() {
		let mut dense = state(0);
		let event = dense.apply(MODEL_RESET, &[rows(&[1, 2]), Variant::Int(0)]).unwrap();
		assert_eq!(event, Some(ListEvent::Reset { row_count: 2 }));
		assert!(matches!(dense.rows, Rows::Dense(_)));
		assert!(dense.loaded);

		let mut windowed = state(0);
		windowed.apply(MODEL_RESET, &[rows(&[1, 2]), Variant::Int(5)]).unwrap();
		assert!(matches!(windowed.rows, Rows::Windowed(_)));
		assert_eq!(windowed.rows.row_count(), 7);

		let mut batched = state(2);
		batched.apply(MODEL_RESET, &[rows(&[1, 2]), Variant::Int(0)]).unwrap();
		assert!(matches!(batched.rows, Rows::Windowed(_)));
	}

	#[test]
	fn test_insert_with_more_rows_goes_windowed() {
		let mut state = state(0);
		state.apply(MODEL_RESET, &[rows(&[1, 2]), Variant::Int(0)]).unwrap();
		let event = state
			.apply(MODEL_INSERT, &[Variant::Int(1), rows(&[9]), Variant::Int(3)])
			.unwrap();
		assert_eq!(event, Some(ListEvent::Inserted { start: 1, count: 4 }));
		assert!(matches!(state.rows, Rows::Windowed(_)));
		assert_eq!(state.rows.row_count(), 6);
	}

	#[test]
	fn test_bad_arguments() {
		let mut state = state(0);
		state.apply(MODEL_RESET, &[rows(&[1, 2]), Variant::Int(0)]).unwrap();
		assert!(state.apply(MODEL_REMOVE, &[Variant::Int(-1), Variant::Int(0)]).is_err());
		assert!(state.apply(MODEL_REMOVE, &[Variant::Int(0)]).is_err());
		assert!(state.apply(MODEL_UPDATE, &[Variant::Int(5), Variant::Null]).is_err());
		assert_eq!(state.apply("somethingElse", &[]).unwrap(), None);
	}

	#[test]
	fn test_noop_move_has_no_event() {
		let mut state = state(0);
		state.apply(MODEL_RESET, &[rows(&[1, 2, 3]), Variant::Int(0)]).unwrap();
		let event = state
			.apply(MODEL_MOVE, &[Variant::Int(0), Variant::Int(1), Variant::Int(1)])
			.unwrap();
		assert_eq!(event, None);
	}
}
