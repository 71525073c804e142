// Fake backend for integration tests.
//
// Builds wire messages and answers the client's queries over the in-memory
// transport.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use qbridge::runtime::testing::{PeerHandle, memory_transport};
use qbridge::{Client, ClientOptions, TypeDescriptor};
use serde_json::{Value, json};

pub fn object_ref(identifier: &str, type_info: &TypeDescriptor) -> Value {
	json!({
		"_qbackend_": "object",
		"identifier": identifier,
		"type": serde_json::to_value(type_info).unwrap(),
	})
}

pub fn omitted_ref(identifier: &str, type_name: &str) -> Value {
	json!({
		"_qbackend_": "object",
		"identifier": identifier,
		"type": {"name": type_name, "omitted": true},
	})
}

pub fn handshake(creatable: &[TypeDescriptor]) -> Vec<Value> {
	vec![
		json!({"command": "VERSION", "version": 1}),
		json!({"command": "CREATABLE_TYPES", "types": serde_json::to_value(creatable).unwrap()}),
	]
}

pub fn root_message(type_info: &TypeDescriptor, data: Value) -> Value {
	json!({
		"command": "ROOT",
		"identifier": "root",
		"type": serde_json::to_value(type_info).unwrap(),
		"data": data,
	})
}

pub fn reset(identifier: &str, data: Value) -> Value {
	json!({"command": "OBJECT_RESET", "identifier": identifier, "data": data})
}

pub fn emit(identifier: &str, method: &str, parameters: Value) -> Value {
	json!({"command": "EMIT", "identifier": identifier, "method": method, "parameters": parameters})
}

/// A client whose backend has already sent the handshake and `ROOT`.
pub fn connect(root_type: &TypeDescriptor, data: Value, options: ClientOptions) -> (Client, PeerHandle) {
	let (transport, peer) = memory_transport();
	peer.send_all(handshake(&[]));
	peer.send(root_message(root_type, data));
	let client = Client::new(Box::new(transport), options).unwrap();
	(client, peer)
}

/// Frames with `command` sent for `identifier`.
pub fn sent_for(peer: &PeerHandle, command: &str, identifier: &str) -> Vec<Value> {
	peer.sent()
		.into_iter()
		.filter(|frame| frame["command"] == command && frame["identifier"] == identifier)
		.collect()
}

/// Parameter lists of every `INVOKE` of `method` on `identifier`.
pub fn invocations(peer: &PeerHandle, identifier: &str, method: &str) -> Vec<Value> {
	sent_for(peer, "INVOKE", identifier)
		.into_iter()
		.filter(|frame| frame["method"] == method)
		.map(|frame| frame["parameters"].clone())
		.collect()
}

pub fn person_type() -> TypeDescriptor {
	TypeDescriptor::named("Person")
		.with_property("name", "string")
		.with_property("age", "int")
		.with_method("setName", &["string"])
		.with_method("greet", &["string who"])
		.with_method("befriend", &["object other"])
		.with_signal("nameChanged", &[])
		.with_signal("greeted", &["string who", "int times"])
}

pub fn model_type() -> TypeDescriptor {
	TypeDescriptor::named("PeopleModel").with_property("_qb_model", "object")
}

pub fn model_api_type() -> TypeDescriptor {
	TypeDescriptor::named("ModelAPI")
		.with_property("roleNames", "array")
		.with_property("batchSize", "int")
		.with_method("reset", &[])
		.with_method("requestRows", &["int", "int"])
		.with_method("setBatchSize", &["int"])
		.with_signal("modelReset", &["array rowData", "int moreRows"])
		.with_signal("modelInsert", &["int start", "array rowData", "int moreRows"])
		.with_signal("modelRemove", &["int start", "int end"])
		.with_signal("modelMove", &["int start", "int end", "int destination"])
		.with_signal("modelUpdate", &["int row", "var data"])
		.with_signal("modelRowData", &["int start", "array rowData"])
}

/// Answers `OBJECT_QUERY` from a table of object data.
#[derive(Clone, Default)]
pub struct ObjectTable {
	data: Arc<Mutex<HashMap<String, Value>>>,
}

impl ObjectTable {
	pub fn set(&self, identifier: &str, data: Value) {
		self.data.lock().insert(identifier.to_string(), data);
	}

	pub fn answer(&self, frame: &Value) -> Option<Value> {
		if frame["command"] != "OBJECT_QUERY" {
			return None;
		}
		let identifier = frame["identifier"].as_str()?;
		let data = self.data.lock().get(identifier).cloned()?;
		Some(reset(identifier, data))
	}
}

/// A list served through a `ModelAPI` companion.
pub struct ListBackend {
	pub model: String,
	pub companion: String,
	pub roles: Vec<String>,
	pub rows: Arc<Mutex<Vec<Value>>>,
	pub batch_size: Arc<Mutex<usize>>,
	/// Sent ahead of the next `modelReset` reply.
	pub before_reset: Arc<Mutex<Vec<Value>>>,
}

impl ListBackend {
	pub fn new(model: &str, roles: &[&str], rows: Vec<Value>) -> Self {
		Self {
			model: model.to_string(),
			companion: format!("{model}-api"),
			roles: roles.iter().map(|r| r.to_string()).collect(),
			rows: Arc::new(Mutex::new(rows)),
			batch_size: Arc::new(Mutex::new(0)),
			before_reset: Arc::new(Mutex::new(Vec::new())),
		}
	}

	/// Installs the responder on `peer`, with `objects` answering other queries.
	pub fn serve(&self, peer: &PeerHandle, objects: ObjectTable) {
		let model = self.model.clone();
		let companion = self.companion.clone();
		let roles = self.roles.clone();
		let rows = Arc::clone(&self.rows);
		let batch_size = Arc::clone(&self.batch_size);
		let before_reset = Arc::clone(&self.before_reset);

		peer.respond_with(move |frame| {
			let identifier = frame["identifier"].as_str().unwrap_or_default();
			let command = frame["command"].as_str().unwrap_or_default();
			let method = frame["method"].as_str().unwrap_or_default();
			let params = frame["parameters"].as_array().cloned().unwrap_or_default();

			match (command, identifier == model, identifier == companion) {
				("OBJECT_QUERY", true, _) => {
					vec![reset(&model, json!({"_qb_model": object_ref(&companion, &model_api_type())}))]
				}
				("OBJECT_QUERY", _, true) => {
					vec![reset(&companion, json!({"roleNames": roles, "batchSize": *batch_size.lock()}))]
				}
				("INVOKE", _, true) => match method {
					"setBatchSize" => {
						*batch_size.lock() = params[0].as_u64().unwrap() as usize;
						vec![reset(&companion, json!({"roleNames": roles, "batchSize": *batch_size.lock()}))]
					}
					"reset" => {
						let rows = rows.lock();
						let batch = *batch_size.lock();
						let pushed = if batch > 0 { batch.min(rows.len()) } else { rows.len() };
						let mut replies: Vec<Value> = before_reset.lock().drain(..).collect();
						replies.push(emit(&companion, "modelReset", json!([rows[..pushed], rows.len() - pushed])));
						replies
					}
					"requestRows" => {
						let rows = rows.lock();
						let start = params[0].as_u64().unwrap() as usize;
						let count = params[1].as_u64().unwrap() as usize;
						let end = (start + count).min(rows.len());
						vec![emit(&companion, "modelRowData", json!([start, rows[start..end]]))]
					}
					_ => Vec::new(),
				},
				_ => objects.answer(frame).into_iter().collect(),
			}
		});
	}
}
