//! Client - entry point tying a transport to dynamic objects.

use std::sync::Arc;
use std::time::Duration;

use qbridge_protocol::TypeDescriptor;
use qbridge_runtime::{Connection, Result, Transport};

use crate::factory::ObjectBuilder;
use crate::object::Object;
use crate::options::ClientOptions;
use crate::schema::SchemaRegistry;

/// A connection to one backend, producing [`Object`] proxies.
///
/// # Example
///
/// ```ignore
/// let (stdin, stdout) = (child.stdin.take().unwrap(), child.stdout.take().unwrap());
/// let transport = PipeTransport::new(stdin, stdout)?;
/// let client = Client::new(Box::new(transport), ClientOptions::default())?;
/// let root = client.root()?;
/// println!("{}", root.property("title")?);
/// ```
pub struct Client {
	connection: Arc<Connection>,
	schemas: Arc<SchemaRegistry>,
	options: ClientOptions,
}

impl Client {
	/// Creates a client over `transport`. Nothing is read until the client is used.
	pub fn new(transport: Box<dyn Transport>, options: ClientOptions) -> Result<Self> {
		let connection = Connection::new(options.connection.clone());
		let client = Self::with_connection(connection, options);
		client.connection.attach_transport(transport)?;
		Ok(client)
	}

	/// Wraps an existing connection, installing the object factory.
	///
	/// Use this to queue writes before the transport exists.
	pub fn with_connection(connection: Arc<Connection>, options: ClientOptions) -> Self {
		let schemas = Arc::new(SchemaRegistry::new());
		connection.set_factory(Arc::new(ObjectBuilder::new(Arc::clone(&schemas), options.list)));
		Self {
			connection,
			schemas,
			options,
		}
	}

	pub fn connection(&self) -> &Arc<Connection> {
		&self.connection
	}

	pub fn schemas(&self) -> &Arc<SchemaRegistry> {
		&self.schemas
	}

	pub fn options(&self) -> &ClientOptions {
		&self.options
	}

	/// Protocol version announced by the backend. Blocks for the handshake.
	pub fn version(&self) -> Result<i64> {
		self.connection.ensure_initialized()?;
		Ok(self.connection.version().unwrap_or_default())
	}

	/// Returns the root object, blocking for the handshake and `ROOT`.
	pub fn root(&self) -> Result<Object> {
		Object::from_remote(self.connection.root()?)
	}

	/// Returns the live object with `identifier`, if any handle to it exists.
	pub fn object(&self, identifier: &str) -> Option<Object> {
		self.connection
			.object(identifier)
			.and_then(|remote| Object::from_remote(remote).ok())
	}

	/// Creates a new object of a creatable type on the backend.
	pub fn instantiate(&self, type_name: &str) -> Result<Object> {
		Object::from_remote(self.connection.instantiate(type_name)?)
	}

	/// Types the backend allows this side to instantiate. Blocks for the handshake.
	pub fn creatable_types(&self) -> Result<Vec<TypeDescriptor>> {
		self.connection.ensure_types()?;
		Ok(self.connection.creatable_types())
	}

	/// Signals that the host is ready for the root object.
	pub fn set_host_ready(&self) -> Result<()> {
		self.connection.set_host_ready()
	}

	pub fn process_events(&self) -> Result<()> {
		self.connection.process_events()
	}

	pub fn poll(&self, timeout: Duration) -> Result<bool> {
		self.connection.poll(timeout)
	}

	/// Pumps events until the backend closes the connection.
	pub fn run(&self) -> Result<()> {
		self.connection.run()
	}

	pub fn close(&self) {
		self.connection.close();
	}
}

impl std::fmt::Debug for Client {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Client")
			.field("connection", &self.connection)
			.field("schemas", &self.schemas.len())
			.finish_non_exhaustive()
	}
}
