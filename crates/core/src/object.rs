//! Object - dynamic adapter for one remote object.
//!
//! An [`Object`] is a cheap handle to a proxy built from a runtime [`Schema`]. It
//! answers property reads from the last snapshot the peer sent, turns property writes
//! into setter invocations, sends method calls, and delivers inbound signals to local
//! listeners. The proxy stays registered with the connection while any handle is
//! alive; dropping the last one sends `OBJECT_DEREF`.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use qbridge_protocol::ObjectRef;
use qbridge_runtime::remote_object::private::Sealed;
use qbridge_runtime::{Channel, Connection, Error, RemoteObject, Result};
use serde_json::{Map, Value};

use crate::handlers::{self, HandlerMap, Subscription, handler_map};
use crate::model::{ListModel, ModelShared};
use crate::options::ListOptions;
use crate::schema::{Property, Schema, ValueKind};
use crate::variant::Variant;

/// Handle to a remote object.
///
/// Clones share one proxy. Two handles are equal when they share the proxy.
#[derive(Clone)]
pub struct Object {
	inner: Arc<ObjectInner>,
}

impl Object {
	/// Wraps a proxy handed out by the connection.
	pub fn from_remote(remote: Arc<dyn RemoteObject>) -> Result<Self> {
		let identifier = remote.identifier().to_string();
		remote
			.downcast_arc::<ObjectInner>()
			.map(|inner| Self { inner })
			.map_err(|_| Error::InvalidArgument(format!("object {identifier} is not a dynamic object")))
	}

	/// Resolves an inbound object reference, building the proxy on first sight.
	///
	/// Returns `None` if `value` is not an object reference.
	pub(crate) fn resolve(connection: &Arc<Connection>, value: &Value) -> Result<Option<Self>> {
		let Some(reference) = ObjectRef::from_value(value) else {
			return Ok(None);
		};
		let remote = match (connection.object(&reference.identifier), reference.type_info) {
			(Some(existing), _) => existing,
			(None, Some(type_info)) => connection.ensure_object(&reference.identifier, &type_info)?,
			(None, None) => return Err(Error::ObjectNotFound(reference.identifier)),
		};
		Self::from_remote(remote).map(Some)
	}

	pub fn identifier(&self) -> &str {
		self.inner.channel.identifier()
	}

	pub fn type_name(&self) -> &str {
		self.inner.schema.name()
	}

	pub fn schema(&self) -> &Arc<Schema> {
		&self.inner.schema
	}

	/// Whether the peer has sent this object's data at least once.
	pub fn is_data_ready(&self) -> bool {
		self.inner.state.lock().data_ready
	}

	pub fn connection(&self) -> Result<Arc<Connection>> {
		self.inner.channel.connection()
	}

	/// Reads a property.
	///
	/// Blocks on a synchronous reset the first time, if no data has arrived yet.
	pub fn property(&self, name: &str) -> Result<Variant> {
		let property = self.inner.property(name)?.clone();
		self.ensure_data()?;
		self.inner.read(&property)
	}

	/// The raw property values from the last reset.
	pub fn snapshot(&self) -> Result<Map<String, Value>> {
		self.ensure_data()?;
		Ok(self.inner.state.lock().snapshot.clone())
	}

	/// Writes a property by invoking its setter method.
	///
	/// The local value changes only when the peer sends the resulting reset.
	pub fn set_property(&self, name: &str, value: impl Into<Variant>) -> Result<()> {
		let property = self.inner.property(name)?;
		let setter = property.setter.as_deref().ok_or_else(|| Error::ReadOnlyProperty {
			type_name: self.type_name().to_string(),
			property: name.to_string(),
		})?;
		self.inner.channel.invoke(setter, vec![value.into().to_wire()])
	}

	/// Invokes a method on the peer. Fire-and-forget.
	pub fn invoke(&self, method: &str, args: Vec<Variant>) -> Result<()> {
		let member = self.inner.schema.method(method).ok_or_else(|| Error::UnknownMethod {
			type_name: self.type_name().to_string(),
			method: method.to_string(),
		})?;
		if member.params.len() != args.len() {
			return Err(Error::InvalidArgument(format!(
				"{}.{method} takes {} arguments, got {}",
				self.type_name(),
				member.params.len(),
				args.len()
			)));
		}
		self.send_invoke(method, args.iter().map(Variant::to_wire).collect())
	}

	/// Sends `INVOKE` without checking the schema.
	pub(crate) fn send_invoke(&self, method: &str, parameters: Vec<Value>) -> Result<()> {
		self.inner.channel.invoke(method, parameters)
	}

	/// Registers a listener for a signal.
	///
	/// Returns a [`Subscription`] that unregisters the listener when dropped.
	pub fn connect<F>(&self, signal: &str, handler: F) -> Result<Subscription>
	where
		F: Fn(Vec<Variant>) -> Result<()> + Send + Sync + 'static,
	{
		if self.inner.schema.signal(signal).is_none() {
			return Err(Error::InvalidArgument(format!(
				"{} has no signal '{signal}'",
				self.type_name()
			)));
		}
		Ok(handlers::register(
			&self.inner.signal_handlers,
			signal.to_string(),
			Arc::new(handler),
		))
	}

	/// Registers a listener for changes to a property.
	///
	/// Called with the new value whenever a reset changes the property. The first
	/// load of the object's data is not a change.
	pub fn on_property_changed<F>(&self, property: &str, handler: F) -> Result<Subscription>
	where
		F: Fn(Variant) -> Result<()> + Send + Sync + 'static,
	{
		self.inner.property(property)?;
		Ok(handlers::register(
			&self.inner.property_handlers,
			property.to_string(),
			Arc::new(handler),
		))
	}

	/// Asks the peer for fresh data; when `synchronous`, blocks until it is applied.
	pub fn reset(&self, synchronous: bool) -> Result<()> {
		self.inner.channel.reset(synchronous)
	}

	pub fn is_model(&self) -> bool {
		self.inner.schema.is_model()
	}

	/// Returns the list model view of this object.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidArgument`] if the type is not a list model.
	pub fn as_model(&self) -> Result<ListModel> {
		ListModel::attach(self)
	}

	pub(crate) fn list_options(&self) -> ListOptions {
		self.inner.list_options
	}

	pub(crate) fn cached_model(&self) -> Option<Arc<ModelShared>> {
		self.inner.model.lock().upgrade()
	}

	pub(crate) fn cache_model(&self, model: &Arc<ModelShared>) {
		*self.inner.model.lock() = Arc::downgrade(model);
	}

	fn ensure_data(&self) -> Result<()> {
		if self.is_data_ready() {
			return Ok(());
		}
		tracing::debug!(identifier = %self.identifier(), "Loading object data");
		self.reset(true)
	}
}

impl PartialEq for Object {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl std::fmt::Debug for Object {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Object")
			.field("identifier", &self.identifier())
			.field("type_name", &self.type_name())
			.finish()
	}
}

#[derive(Default)]
struct ObjectState {
	snapshot: Map<String, Value>,
	data_ready: bool,
	/// Objects referenced from the snapshot, by property name.
	children: HashMap<String, Object>,
}

/// The proxy behind [`Object`] handles.
pub struct ObjectInner {
	channel: Channel,
	schema: Arc<Schema>,
	list_options: ListOptions,
	state: Mutex<ObjectState>,
	signal_handlers: HandlerMap<Vec<Variant>, String>,
	property_handlers: HandlerMap<Variant, String>,
	model: Mutex<Weak<ModelShared>>,
}

impl ObjectInner {
	pub(crate) fn new(channel: Channel, schema: Arc<Schema>, list_options: ListOptions) -> Self {
		Self {
			channel,
			schema,
			list_options,
			state: Mutex::new(ObjectState::default()),
			signal_handlers: handler_map(),
			property_handlers: handler_map(),
			model: Mutex::new(Weak::new()),
		}
	}

	fn property(&self, name: &str) -> Result<&Property> {
		self.schema.property(name).ok_or_else(|| Error::UnknownProperty {
			type_name: self.schema.name().to_string(),
			property: name.to_string(),
		})
	}

	fn read(&self, property: &Property) -> Result<Variant> {
		let (value, child) = {
			let state = self.state.lock();
			(
				state.snapshot.get(&property.name).cloned().unwrap_or(Value::Null),
				state.children.get(&property.name).cloned(),
			)
		};
		if let Some(child) = child {
			return Ok(Variant::Object(child));
		}
		let connection = self.channel.connection()?;
		Variant::from_wire(&connection, property.kind, value)
	}

	/// Resolves the objects the snapshot references and holds them.
	///
	/// Children whose reference did not change keep their proxy; the others are
	/// released once the new set is in place.
	fn refresh_children(&self) {
		let references: Vec<(String, Value)> = {
			let state = self.state.lock();
			self.schema
				.properties()
				.filter(|p| matches!(p.kind, ValueKind::Object | ValueKind::Var))
				.filter_map(|p| {
					let value = state.snapshot.get(&p.name)?;
					ObjectRef::from_value(value)?;
					Some((p.name.clone(), value.clone()))
				})
				.collect()
		};

		let mut children = HashMap::new();
		if !references.is_empty() {
			let Ok(connection) = self.channel.connection() else {
				return;
			};
			for (name, value) in references {
				match Object::resolve(&connection, &value) {
					Ok(Some(child)) if child.identifier() == self.channel.identifier() => {
						tracing::debug!(identifier = %self.channel.identifier(), property = %name, "Object references itself");
					}
					Ok(Some(child)) => {
						children.insert(name, child);
					}
					Ok(None) => {}
					Err(e) => {
						tracing::warn!(identifier = %self.channel.identifier(), property = %name, error = %e, "Failed to resolve object property");
					}
				}
			}
		}

		let previous = std::mem::replace(&mut self.state.lock().children, children);
		drop(previous);
	}

	fn notify_changed(&self, property: &Property) {
		let value = match self.read(property) {
			Ok(value) => value,
			Err(e) => {
				tracing::warn!(identifier = %self.channel.identifier(), property = %property.name, error = %e, "Failed to read changed property");
				return;
			}
		};
		tracing::trace!(identifier = %self.channel.identifier(), property = %property.name, "Property changed");
		handlers::dispatch(
			&self.property_handlers,
			|name| *name == property.name,
			value,
			"property",
		);
		if let Some(signal) = &property.change_signal {
			handlers::dispatch(&self.signal_handlers, |name| name == signal, Vec::new(), "signal");
		}
	}
}

impl Sealed for ObjectInner {}

impl RemoteObject for ObjectInner {
	fn identifier(&self) -> &str {
		self.channel.identifier()
	}

	fn type_name(&self) -> &str {
		self.schema.name()
	}

	fn object_found(&self, data: Map<String, Value>) {
		let changed: Option<Vec<Property>> = {
			let mut state = self.state.lock();
			let first = !state.data_ready;
			let previous = std::mem::replace(&mut state.snapshot, data);
			state.data_ready = true;
			(!first).then(|| {
				self.schema
					.properties()
					.filter(|p| previous.get(&p.name) != state.snapshot.get(&p.name))
					.cloned()
					.collect()
			})
		};
		self.refresh_children();

		let Some(changed) = changed else {
			tracing::debug!(identifier = %self.channel.identifier(), "Object data loaded");
			return;
		};
		for property in &changed {
			self.notify_changed(property);
		}
	}

	fn method_invoked(&self, method: &str, parameters: Vec<Value>) {
		let identifier = self.channel.identifier();
		let Some(signal) = self.schema.signal(method) else {
			tracing::warn!(identifier = %identifier, signal = method, "Emit of unknown signal (dropped)");
			return;
		};
		if signal.params.len() != parameters.len() {
			tracing::warn!(
				identifier = %identifier,
				signal = method,
				expected = signal.params.len(),
				received = parameters.len(),
				"Signal parameter count mismatch (dropped)"
			);
			return;
		}
		let Ok(connection) = self.channel.connection() else {
			return;
		};
		let args: Result<Vec<Variant>> = signal
			.params
			.iter()
			.zip(parameters)
			.map(|(param, value)| Variant::from_wire(&connection, param.kind, value))
			.collect();
		match args {
			Ok(args) => handlers::dispatch(&self.signal_handlers, |name| name == method, args, "signal"),
			Err(e) => {
				tracing::warn!(identifier = %identifier, signal = method, error = %e, "Failed to marshal signal (dropped)")
			}
		}
	}
}

impl Drop for ObjectInner {
	fn drop(&mut self) {
		self.channel.release(&*self);
	}
}
