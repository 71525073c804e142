//! Builds object proxies for the connection.

use std::sync::Arc;

use qbridge_protocol::TypeDescriptor;
use qbridge_runtime::{Channel, Connection, ObjectFactory, RemoteObject, Result};

use crate::object::ObjectInner;
use crate::options::ListOptions;
use crate::schema::SchemaRegistry;

/// [`ObjectFactory`] producing dynamic [`Object`](crate::Object) proxies.
///
/// Every type descriptor goes through the shared [`SchemaRegistry`], so all objects
/// of one type share a schema.
pub struct ObjectBuilder {
	schemas: Arc<SchemaRegistry>,
	list_options: ListOptions,
}

impl ObjectBuilder {
	pub fn new(schemas: Arc<SchemaRegistry>, list_options: ListOptions) -> Self {
		Self {
			schemas,
			list_options,
		}
	}

	pub fn schemas(&self) -> &Arc<SchemaRegistry> {
		&self.schemas
	}
}

impl ObjectFactory for ObjectBuilder {
	fn create_object(
		&self,
		connection: &Arc<Connection>,
		identifier: Arc<str>,
		type_info: &TypeDescriptor,
	) -> Result<Arc<dyn RemoteObject>> {
		let schema = self.schemas.resolve(type_info);
		let channel = Channel::new(identifier, connection);
		Ok(Arc::new(ObjectInner::new(channel, schema, self.list_options)))
	}
}
