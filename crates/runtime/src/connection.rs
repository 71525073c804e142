//! Connection state machine and message dispatch.
//!
//! The connection owns the transport, the frame decoder, the handshake state and the
//! object registry. It is driven cooperatively: nothing happens until the application
//! pumps it ([`Connection::process_events`], [`Connection::poll`], [`Connection::run`])
//! or some operation blocks in a synchronous wait.
//!
//! # Dispatch
//!
//! Every decoded message goes through the same routing step:
//!
//! 1. While synchronous waits are outstanding, a message is handed to the innermost
//!    unresolved wait whose predicate accepts it, and only if the current state
//!    permits its command. Anything else is queued.
//! 2. Without waits, a command the current state does not permit is queued.
//! 3. Otherwise the message is handled: handshake commands advance the state, object
//!    commands are routed to the registered proxy.
//!
//! The queue is replayed in arrival order after any state advance, and after a
//! completed wait once the awaited message itself has been handled. Routing during
//! the replay is the same step again.
//!
//! # Re-entrancy
//!
//! Handlers may block in nested waits (a property read that needs a synchronous reset,
//! a list fetching rows). Waits form a stack of slots; a nested wait keeps pumping the
//! shared inbox, so messages an outer wait is looking for are parked in its slot and
//! picked up when control returns to it. No lock is held while calling into a proxy.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use qbridge_protocol::message::{CREATABLE_TYPES, OBJECT_RESET, ROOT, VERSION};
use qbridge_protocol::{FrameDecoder, Inbound, Message, Outbound, TypeDescriptor, encode};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::options::ConnectionOptions;
use crate::remote_object::RemoteObject;
use crate::transport::Transport;

mod object_store;

pub use object_store::{ObjectStore, Registration};

/// Identifier the peer uses for the root object.
pub const ROOT_IDENTIFIER: &str = "root";

/// Factory trait for creating object proxies.
///
/// This decouples the connection from the concrete proxy type, which lives in the
/// `qbridge` crate. Creation must not pump the connection: the proxy is registered
/// right after the factory returns.
pub trait ObjectFactory: Send + Sync {
	/// Builds a proxy for `identifier` with the given type.
	fn create_object(
		&self,
		connection: &Arc<Connection>,
		identifier: Arc<str>,
		type_info: &TypeDescriptor,
	) -> Result<Arc<dyn RemoteObject>>;
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	WantVersion,
	WantTypes,
	WantHostReady,
	Established,
}

impl ConnectionState {
	/// Whether a command may be handled in this state.
	pub fn permits(self, command: &str) -> bool {
		match self {
			ConnectionState::WantVersion => command == VERSION,
			ConnectionState::WantTypes => command == CREATABLE_TYPES,
			ConnectionState::WantHostReady => false,
			ConnectionState::Established => true,
		}
	}
}

type Predicate = Box<dyn Fn(&Message) -> bool + Send>;

struct WaitSlot {
	id: u64,
	predicate: Predicate,
	result: Option<Message>,
}

enum Routed {
	Handled,
	Stolen,
	Deferred(Message),
}

struct Io {
	transport: Option<Box<dyn Transport>>,
	/// Frames written before a transport was attached.
	unsent: Vec<u8>,
	decoder: FrameDecoder,
	read_buf: Vec<u8>,
	closed: Option<Error>,
}

/// A connection to one peer.
///
/// Always used through an `Arc`; proxies and channels hold it weakly.
pub struct Connection {
	options: ConnectionOptions,
	state: Mutex<ConnectionState>,
	io: Mutex<Io>,
	/// Decoded messages not yet routed.
	inbox: Mutex<VecDeque<Message>>,
	/// Routed messages deferred by state or by outstanding waits.
	pending: Mutex<VecDeque<Message>>,
	waits: Mutex<Vec<WaitSlot>>,
	next_wait_id: AtomicU64,
	objects: ObjectStore,
	factory: Mutex<Option<Arc<dyn ObjectFactory>>>,
	version: Mutex<Option<i64>>,
	creatable_types: Mutex<Vec<TypeDescriptor>>,
	host_ready: AtomicBool,
	root: Mutex<Option<Arc<dyn RemoteObject>>>,
	nonce: String,
	next_instance: AtomicU64,
}

impl Connection {
	/// Creates a connection with no transport.
	///
	/// Writes are buffered until [`attach_transport`](Self::attach_transport).
	pub fn new(options: ConnectionOptions) -> Arc<Self> {
		let host_ready = options.host_ready;
		Arc::new(Self {
			options,
			state: Mutex::new(ConnectionState::WantVersion),
			io: Mutex::new(Io {
				transport: None,
				unsent: Vec::new(),
				decoder: FrameDecoder::new(),
				read_buf: Vec::new(),
				closed: None,
			}),
			inbox: Mutex::new(VecDeque::new()),
			pending: Mutex::new(VecDeque::new()),
			waits: Mutex::new(Vec::new()),
			next_wait_id: AtomicU64::new(0),
			objects: ObjectStore::new(),
			factory: Mutex::new(None),
			version: Mutex::new(None),
			creatable_types: Mutex::new(Vec::new()),
			host_ready: AtomicBool::new(host_ready),
			root: Mutex::new(None),
			nonce: format!("{:016x}", rand::random::<u64>()),
			next_instance: AtomicU64::new(1),
		})
	}

	/// Creates a connection over `transport`.
	pub fn with_transport(transport: Box<dyn Transport>, options: ConnectionOptions) -> Result<Arc<Self>> {
		let connection = Self::new(options);
		connection.attach_transport(transport)?;
		Ok(connection)
	}

	/// Attaches the transport and flushes writes buffered so far, in order.
	pub fn attach_transport(&self, transport: Box<dyn Transport>) -> Result<()> {
		let result = {
			let mut io = self.io.lock();
			if let Some(reason) = &io.closed {
				return Err(closed_error(reason));
			}
			if io.transport.is_some() {
				return Err(Error::Transport("transport already attached".to_string()));
			}
			let unsent = std::mem::take(&mut io.unsent);
			let transport = io.transport.insert(transport);
			tracing::debug!(buffered = unsent.len(), "Transport attached");
			if unsent.is_empty() {
				Ok(())
			} else {
				transport.write(&unsent)
			}
		};
		result.map_err(|e| self.fail(e))
	}

	/// Sets the factory used to build proxies.
	pub fn set_factory(&self, factory: Arc<dyn ObjectFactory>) {
		*self.factory.lock() = Some(factory);
	}

	pub fn options(&self) -> &ConnectionOptions {
		&self.options
	}

	pub fn state(&self) -> ConnectionState {
		*self.state.lock()
	}

	/// Protocol version announced by the peer, once received.
	pub fn version(&self) -> Option<i64> {
		*self.version.lock()
	}

	/// Types the peer allows this side to instantiate.
	pub fn creatable_types(&self) -> Vec<TypeDescriptor> {
		self.creatable_types.lock().clone()
	}

	pub fn objects(&self) -> &ObjectStore {
		&self.objects
	}

	/// Returns the live proxy for `identifier`.
	pub fn object(&self, identifier: &str) -> Option<Arc<dyn RemoteObject>> {
		self.objects.get(identifier)
	}

	pub fn is_closed(&self) -> bool {
		self.io.lock().closed.is_some()
	}

	/// The error that closed the connection, if it is closed.
	pub fn close_reason(&self) -> Option<Error> {
		self.io.lock().closed.clone()
	}

	/// Marks the host as ready, completing the handshake if types were received.
	pub fn set_host_ready(self: &Arc<Self>) -> Result<()> {
		self.host_ready.store(true, Ordering::SeqCst);
		let advanced = {
			let mut state = self.state.lock();
			if *state == ConnectionState::WantHostReady {
				*state = ConnectionState::Established;
				true
			} else {
				false
			}
		};
		if advanced {
			tracing::info!("Connection established");
			self.handle_pending()?;
		}
		Ok(())
	}

	/// Blocks until the peer's `VERSION` has been handled.
	pub fn ensure_initialized(self: &Arc<Self>) -> Result<()> {
		self.check_open()?;
		if self.state() != ConnectionState::WantVersion {
			return Ok(());
		}
		self.wait_and_handle(VERSION, |message| message.command() == VERSION)
	}

	/// Blocks until the peer's `CREATABLE_TYPES` has been handled.
	pub fn ensure_types(self: &Arc<Self>) -> Result<()> {
		self.ensure_initialized()?;
		if self.state() != ConnectionState::WantTypes {
			return Ok(());
		}
		self.wait_and_handle(CREATABLE_TYPES, |message| {
			message.command() == CREATABLE_TYPES
		})
	}

	/// Returns the root object, blocking until the peer has sent it.
	///
	/// # Errors
	///
	/// Returns [`Error::ProtocolOrder`] without closing the connection if the host has
	/// not been marked ready, since the root cannot arrive before that.
	pub fn root(self: &Arc<Self>) -> Result<Arc<dyn RemoteObject>> {
		self.ensure_types()?;
		if self.state() != ConnectionState::Established {
			return Err(Error::ProtocolOrder(
				"root requested before the host is ready".to_string(),
			));
		}
		if let Some(root) = self.root.lock().clone() {
			return Ok(root);
		}
		self.wait_and_handle(ROOT, |message| {
			message.command() == ROOT && message.identifier() == Some(ROOT_IDENTIFIER)
		})?;
		self.root
			.lock()
			.clone()
			.ok_or_else(|| Error::ObjectNotFound(ROOT_IDENTIFIER.to_string()))
	}

	/// Reads and dispatches whatever is available without blocking.
	pub fn process_events(self: &Arc<Self>) -> Result<()> {
		self.check_open()?;
		self.process_incoming()
	}

	/// Waits up to `timeout` for input, then dispatches it.
	///
	/// Returns false if nothing arrived.
	pub fn poll(self: &Arc<Self>, timeout: Duration) -> Result<bool> {
		self.check_open()?;
		let idle = self.inbox.lock().is_empty();
		if idle && !self.wait_ready(timeout)? {
			return Ok(false);
		}
		self.process_incoming()?;
		Ok(true)
	}

	/// Pumps events until the connection closes.
	///
	/// Returns `Ok` when the peer or [`close`](Self::close) ended the connection, and
	/// the fatal error otherwise.
	pub fn run(self: &Arc<Self>) -> Result<()> {
		loop {
			match self.poll(self.options.wait_timeout_duration()) {
				Ok(_) => continue,
				Err(_) if self.is_closed() => {
					return match self.close_reason() {
						Some(Error::ConnectionClosed(_)) | None => Ok(()),
						Some(reason) => Err(reason),
					};
				}
				Err(e) => return Err(e),
			}
		}
	}

	/// Closes the transport and releases the root and the registry.
	pub fn close(&self) {
		if self.shutdown(Error::ConnectionClosed("closed locally".to_string())) {
			tracing::debug!("Connection closed");
		}
	}

	/// Sends a command to the peer.
	pub fn send(&self, command: &Outbound) -> Result<()> {
		let bytes = encode(&command.to_value()?)?;
		let result = {
			let mut io = self.io.lock();
			if let Some(reason) = &io.closed {
				return Err(closed_error(reason));
			}
			tracing::trace!(command = ?command, "Sending");
			match io.transport.as_mut() {
				Some(transport) => transport.write(&bytes),
				None => {
					io.unsent.extend_from_slice(&bytes);
					Ok(())
				}
			}
		};
		result.map_err(|e| self.fail(e))
	}

	/// Sends `INVOKE` for a method on a remote object.
	pub fn invoke_method(&self, identifier: &str, method: &str, parameters: Vec<Value>) -> Result<()> {
		self.send(&Outbound::Invoke {
			identifier: identifier.to_string(),
			method: method.to_string(),
			parameters,
		})
	}

	/// Returns the proxy for `identifier`, creating and referencing it if needed.
	pub fn ensure_object(
		self: &Arc<Self>,
		identifier: &str,
		type_info: &TypeDescriptor,
	) -> Result<Arc<dyn RemoteObject>> {
		if let Some(existing) = self.objects.get(identifier) {
			if existing.type_name() != type_info.name {
				tracing::warn!(
					identifier,
					existing = existing.type_name(),
					announced = %type_info.name,
					"Duplicate object identifier with another type, reusing existing proxy"
				);
			} else {
				tracing::trace!(identifier, "Reusing live proxy");
			}
			return Ok(existing);
		}
		self.check_open()?;

		let factory = self.factory()?;
		let identifier: Arc<str> = Arc::from(identifier);
		let object = factory.create_object(self, Arc::clone(&identifier), type_info)?;

		match self.objects.insert(Arc::clone(&identifier), &object) {
			Registration::Inserted => {
				tracing::debug!(identifier = %identifier, type_name = %type_info.name, "Created object");
				self.send(&Outbound::ObjectRef {
					identifier: identifier.to_string(),
				})?;
				Ok(object)
			}
			Registration::Existing(existing) => {
				tracing::warn!(identifier = %identifier, "Duplicate object identifier, reusing existing proxy");
				Ok(existing)
			}
		}
	}

	/// Creates a new object of a creatable type on the peer.
	pub fn instantiate(self: &Arc<Self>, type_name: &str) -> Result<Arc<dyn RemoteObject>> {
		self.ensure_types()?;
		let type_info = self
			.creatable_types
			.lock()
			.iter()
			.find(|t| t.name == type_name)
			.cloned()
			.ok_or_else(|| Error::UnknownType(type_name.to_string()))?;

		let identifier: Arc<str> = Arc::from(format!(
			"{}-{}",
			self.nonce,
			self.next_instance.fetch_add(1, Ordering::SeqCst)
		));
		let object = self
			.factory()?
			.create_object(self, Arc::clone(&identifier), &type_info)?;

		if let Registration::Existing(_) = self.objects.insert(Arc::clone(&identifier), &object) {
			return Err(Error::InvalidArgument(format!(
				"instance identifier {identifier} already in use"
			)));
		}
		tracing::debug!(identifier = %identifier, type_name, "Instantiated object");
		self.send(&Outbound::ObjectCreate {
			type_name: type_name.to_string(),
			identifier: identifier.to_string(),
		})?;
		Ok(object)
	}

	/// Deregisters `expected` and sends `OBJECT_DEREF`.
	///
	/// A release for an identifier registered to another proxy, or not registered at
	/// all, is ignored.
	pub fn remove_object(&self, identifier: &str, expected: &dyn RemoteObject) -> Result<()> {
		if !self.objects.remove_if(identifier, expected) {
			tracing::debug!(identifier, "Ignoring release of stale proxy");
			return Ok(());
		}
		if self.is_closed() {
			return Ok(());
		}
		tracing::debug!(identifier, "Removed object");
		self.send(&Outbound::ObjectDeref {
			identifier: identifier.to_string(),
		})
	}

	/// Sends `OBJECT_QUERY`; when `synchronous`, blocks until the reset is applied.
	pub fn reset_object_data(self: &Arc<Self>, identifier: &str, synchronous: bool) -> Result<()> {
		self.send(&Outbound::ObjectQuery {
			identifier: identifier.to_string(),
		})?;
		if !synchronous {
			return Ok(());
		}
		let expected = identifier.to_string();
		self.wait_and_handle(OBJECT_RESET, move |message| {
			message.command() == OBJECT_RESET && message.identifier() == Some(expected.as_str())
		})
	}

	/// Blocks until a message accepted by `predicate` arrives, and returns it.
	///
	/// The returned message has not been handled. Other messages arriving meanwhile
	/// stay queued, so the caller can act on the returned one first; the queue is
	/// replayed by the next dispatch. Timing out is fatal.
	pub fn wait_for_message<P>(self: &Arc<Self>, label: &str, predicate: P) -> Result<Message>
	where
		P: Fn(&Message) -> bool + Send + 'static,
	{
		self.check_open()?;
		self.flush_transport()?;

		let id = self.next_wait_id.fetch_add(1, Ordering::SeqCst);
		let depth = {
			let mut waits = self.waits.lock();
			waits.push(WaitSlot {
				id,
				predicate: Box::new(predicate),
				result: None,
			});
			waits.len()
		};
		tracing::debug!(waiting_for = label, depth, "Waiting for message");

		let outcome = self.pump_until_resolved(id, label);
		let slot = {
			let mut waits = self.waits.lock();
			waits
				.iter()
				.position(|slot| slot.id == id)
				.map(|index| waits.remove(index))
		};
		outcome?;

		let message = slot.and_then(|slot| slot.result).ok_or_else(|| {
			Error::ConnectionClosed(format!("wait for {label} lost its result"))
		})?;
		Ok(message)
	}

	/// Like [`wait_for_message`](Self::wait_for_message), then handles the message
	/// before anything that was queued behind it.
	pub fn wait_and_handle<P>(self: &Arc<Self>, label: &str, predicate: P) -> Result<()>
	where
		P: Fn(&Message) -> bool + Send + 'static,
	{
		let message = self.wait_for_message(label, predicate)?;
		self.handle(message)?;
		self.handle_pending()
	}

	fn pump_until_resolved(self: &Arc<Self>, id: u64, label: &str) -> Result<()> {
		self.handle_pending()?;
		let deadline = Instant::now() + self.options.wait_timeout_duration();
		loop {
			if self.is_resolved(id) {
				return Ok(());
			}
			self.check_open()?;
			if !self.inbox.lock().is_empty() {
				self.dispatch_inbox()?;
				continue;
			}
			let remaining = deadline.saturating_duration_since(Instant::now());
			if remaining.is_zero() || !self.wait_ready(remaining)? {
				return Err(self.fail(Error::Timeout {
					waiting_for: label.to_string(),
					timeout_ms: self.options.wait_timeout_ms,
				}));
			}
			self.process_incoming()?;
		}
	}

	fn is_resolved(&self, id: u64) -> bool {
		self.waits
			.lock()
			.iter()
			.any(|slot| slot.id == id && slot.result.is_some())
	}

	fn process_incoming(self: &Arc<Self>) -> Result<()> {
		let open = self.read_transport()?;
		self.dispatch_inbox()?;
		if !open && self.shutdown(Error::ConnectionClosed("peer closed the connection".to_string())) {
			tracing::info!("Peer closed the connection");
		}
		Ok(())
	}

	/// Reads available bytes and moves complete messages into the inbox.
	///
	/// Returns whether the transport is still open.
	fn read_transport(&self) -> Result<bool> {
		let mut decoded = Vec::new();
		let (open, failure) = {
			let mut guard = self.io.lock();
			let io = &mut *guard;
			let Some(transport) = io.transport.as_mut() else {
				return Ok(true);
			};
			io.read_buf.clear();
			let read = transport
				.check()
				.and_then(|()| transport.read_available(&mut io.read_buf));
			let open = transport.is_open();
			match read {
				Err(e) => (open, Some(e)),
				Ok(_) => {
					io.decoder.push(&io.read_buf);
					let mut failure = None;
					loop {
						match io.decoder.next_message() {
							Ok(Some(message)) => decoded.push(message),
							Ok(None) => break,
							Err(e) => {
								failure = Some(Error::from(e));
								break;
							}
						}
					}
					(open, failure)
				}
			}
		};

		for message in &decoded {
			tracing::trace!(command = message.command(), identifier = ?message.identifier(), "Received");
		}
		self.inbox.lock().extend(decoded);
		match failure {
			Some(e) => Err(self.fail(e)),
			None => Ok(open),
		}
	}

	fn dispatch_inbox(self: &Arc<Self>) -> Result<()> {
		loop {
			if self.waits.lock().is_empty() {
				self.handle_pending()?;
			}
			let Some(message) = self.inbox.lock().pop_front() else {
				return Ok(());
			};
			match self.route(message)? {
				Routed::Handled => {}
				// Let the resolved waiter see its message before anything newer runs.
				Routed::Stolen => return Ok(()),
				Routed::Deferred(message) => self.pending.lock().push_back(message),
			}
		}
	}

	/// Replays the queue in order. Deferred messages keep their position.
	fn handle_pending(self: &Arc<Self>) -> Result<()> {
		let mut index = 0;
		loop {
			let message = {
				let mut pending = self.pending.lock();
				if index >= pending.len() {
					return Ok(());
				}
				pending.remove(index)
			};
			let Some(message) = message else {
				return Ok(());
			};
			match self.route(message)? {
				// Handling may advance the state or run nested waits; rescan.
				Routed::Handled => index = 0,
				Routed::Stolen => {}
				Routed::Deferred(message) => {
					let mut pending = self.pending.lock();
					let at = index.min(pending.len());
					pending.insert(at, message);
					index = at + 1;
				}
			}
		}
	}

	fn route(self: &Arc<Self>, message: Message) -> Result<Routed> {
		let state = self.state();
		{
			let mut waits = self.waits.lock();
			if !waits.is_empty() {
				let slot = if state.permits(message.command()) {
					waits
						.iter_mut()
						.rev()
						.find(|slot| slot.result.is_none() && (slot.predicate)(&message))
				} else {
					None
				};
				return Ok(match slot {
					Some(slot) => {
						tracing::trace!(command = message.command(), "Message satisfies a synchronous wait");
						slot.result = Some(message);
						Routed::Stolen
					}
					None => Routed::Deferred(message),
				});
			}
		}

		if !state.permits(message.command()) {
			tracing::debug!(command = message.command(), state = ?state, "Deferring command");
			return Ok(Routed::Deferred(message));
		}

		self.handle(message)?;
		Ok(Routed::Handled)
	}

	fn handle(self: &Arc<Self>, message: Message) -> Result<()> {
		let inbound = Inbound::from_message(&message).map_err(|e| self.fail(e.into()))?;
		match inbound {
			Inbound::Version { version } => {
				self.advance(ConnectionState::WantVersion, ConnectionState::WantTypes, VERSION)?;
				*self.version.lock() = Some(version);
				tracing::info!(version, "Protocol version received");
			}
			Inbound::CreatableTypes { types } => {
				let next = if self.host_ready.load(Ordering::SeqCst) {
					ConnectionState::Established
				} else {
					ConnectionState::WantHostReady
				};
				tracing::debug!(count = types.len(), "Creatable types received");
				*self.creatable_types.lock() = types;
				self.advance(ConnectionState::WantTypes, next, CREATABLE_TYPES)?;
				if next == ConnectionState::Established {
					tracing::info!("Connection established");
				}
			}
			Inbound::Root {
				identifier,
				type_info,
				data,
			} => self.handle_root(&identifier, &type_info, data)?,
			Inbound::ObjectReset { identifier, data } => match self.objects.get(&identifier) {
				Some(object) => object.object_found(data),
				None => tracing::debug!(identifier = %identifier, "Reset for unknown object (ignored)"),
			},
			Inbound::Emit {
				identifier,
				method,
				parameters,
			} => match self.objects.get(&identifier) {
				Some(object) => object.method_invoked(&method, parameters),
				None => {
					tracing::debug!(identifier = %identifier, method = %method, "Emit for unknown object (ignored)")
				}
			},
		}
		Ok(())
	}

	fn advance(&self, from: ConnectionState, to: ConnectionState, command: &str) -> Result<()> {
		let current = {
			let mut state = self.state.lock();
			if *state == from {
				*state = to;
				return Ok(());
			}
			*state
		};
		Err(self.fail(Error::ProtocolOrder(format!(
			"{command} received in state {current:?}"
		))))
	}

	fn handle_root(
		self: &Arc<Self>,
		identifier: &str,
		type_info: &TypeDescriptor,
		data: Map<String, Value>,
	) -> Result<()> {
		if identifier != ROOT_IDENTIFIER {
			tracing::warn!(identifier = %identifier, "Ignoring ROOT with unexpected identifier");
			return Ok(());
		}
		let object = self.ensure_object(identifier, type_info)?;
		object.object_found(data);
		let previous = self.root.lock().replace(object);
		drop(previous);
		Ok(())
	}

	fn factory(&self) -> Result<Arc<dyn ObjectFactory>> {
		self.factory
			.lock()
			.clone()
			.ok_or_else(|| Error::InvalidArgument("no object factory installed".to_string()))
	}

	fn wait_ready(&self, timeout: Duration) -> Result<bool> {
		let result = {
			let mut io = self.io.lock();
			match io.transport.as_mut() {
				Some(transport) => transport
					.wait_for_ready_read(timeout)
					.and_then(|ready| transport.check().map(|()| ready)),
				None => return Err(Error::Transport("no transport attached".to_string())),
			}
		};
		result.map_err(|e| self.fail(e))
	}

	fn flush_transport(&self) -> Result<()> {
		let result = {
			let mut io = self.io.lock();
			match io.transport.as_mut() {
				Some(transport) => transport.flush(self.options.wait_timeout_duration()),
				None => Ok(()),
			}
		};
		result.map_err(|e| self.fail(e))
	}

	fn check_open(&self) -> Result<()> {
		match &self.io.lock().closed {
			Some(reason) => Err(closed_error(reason)),
			None => Ok(()),
		}
	}

	/// Closes the connection because of a fatal error, returning the error.
	fn fail(&self, error: Error) -> Error {
		if self.shutdown(error.clone()) {
			tracing::error!(error = %error, "Connection failed");
		}
		error
	}

	/// Records `reason`, closes the transport and drops the root and the registry.
	///
	/// Returns false if the connection was already closed.
	fn shutdown(&self, reason: Error) -> bool {
		let transport = {
			let mut io = self.io.lock();
			if io.closed.is_some() {
				return false;
			}
			io.closed = Some(reason);
			io.transport.take()
		};
		if let Some(mut transport) = transport {
			transport.close();
		}
		let root = self.root.lock().take();
		drop(root);
		self.objects.clear();
		true
	}
}

fn closed_error(reason: &Error) -> Error {
	match reason {
		Error::ConnectionClosed(_) => reason.clone(),
		other => Error::ConnectionClosed(other.to_string()),
	}
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("state", &self.state())
			.field("version", &self.version())
			.field("objects", &self.objects.len())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests;
