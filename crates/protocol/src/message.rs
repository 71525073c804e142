//! Protocol messages.
//!
//! A [`Message`] is any JSON object carrying a `command` string. The connection keeps
//! messages in this raw form while they wait in its queue or are offered to synchronous
//! waiters; [`Inbound`] is the typed view taken when a message is finally handled, and
//! [`Outbound`] covers everything this side of the connection sends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::TypeDescriptor;

pub const VERSION: &str = "VERSION";
pub const CREATABLE_TYPES: &str = "CREATABLE_TYPES";
pub const ROOT: &str = "ROOT";
pub const OBJECT_RESET: &str = "OBJECT_RESET";
pub const EMIT: &str = "EMIT";

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
	command: String,
	fields: Map<String, Value>,
}

impl Message {
	/// Wraps a JSON value, which must be an object with a string `command` field.
	pub fn from_value(value: Value) -> Result<Self, String> {
		let Value::Object(fields) = value else {
			return Err(format!("expected a JSON object, got {}", kind_of(&value)));
		};
		let command = match fields.get("command") {
			Some(Value::String(command)) => command.clone(),
			Some(other) => return Err(format!("`command` is {}, not a string", kind_of(other))),
			None => return Err("missing `command` field".to_string()),
		};
		Ok(Self { command, fields })
	}

	pub fn command(&self) -> &str {
		&self.command
	}

	/// The `identifier` field, for object-addressed commands.
	pub fn identifier(&self) -> Option<&str> {
		self.fields.get("identifier").and_then(Value::as_str)
	}

	/// The `method` field of an `EMIT`.
	pub fn method(&self) -> Option<&str> {
		self.fields.get("method").and_then(Value::as_str)
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.fields.get(key)
	}

	/// True for the commands that make up the connection handshake.
	pub fn is_handshake(&self) -> bool {
		matches!(self.command.as_str(), VERSION | CREATABLE_TYPES)
	}

	pub fn to_value(&self) -> Value {
		Value::Object(self.fields.clone())
	}

	pub fn into_value(self) -> Value {
		Value::Object(self.fields)
	}
}

fn kind_of(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}

/// Why a message could not be turned into an [`Inbound`] command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
	/// The command name is not part of the protocol.
	UnknownCommand(String),
	/// The command is known but its fields are malformed.
	Malformed { command: String, reason: String },
}

impl std::fmt::Display for DecodeError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			DecodeError::UnknownCommand(command) => write!(f, "unknown command {command}"),
			DecodeError::Malformed { command, reason } => {
				write!(f, "malformed {command} message: {reason}")
			}
		}
	}
}

impl std::error::Error for DecodeError {}

/// Typed view of the commands the peer sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
	Version {
		version: i64,
	},
	CreatableTypes {
		types: Vec<TypeDescriptor>,
	},
	Root {
		identifier: String,
		type_info: TypeDescriptor,
		data: Map<String, Value>,
	},
	ObjectReset {
		identifier: String,
		data: Map<String, Value>,
	},
	Emit {
		identifier: String,
		method: String,
		parameters: Vec<Value>,
	},
}

#[derive(Deserialize)]
struct VersionBody {
	version: i64,
}

#[derive(Deserialize)]
struct CreatableTypesBody {
	#[serde(default)]
	types: Vec<TypeDescriptor>,
}

#[derive(Deserialize)]
struct RootBody {
	identifier: String,
	#[serde(rename = "type")]
	type_info: TypeDescriptor,
	#[serde(default)]
	data: Map<String, Value>,
}

#[derive(Deserialize)]
struct ObjectResetBody {
	identifier: String,
	#[serde(default)]
	data: Map<String, Value>,
}

#[derive(Deserialize)]
struct EmitBody {
	identifier: String,
	method: String,
	#[serde(default)]
	parameters: Vec<Value>,
}

impl Inbound {
	pub fn from_message(message: &Message) -> Result<Self, DecodeError> {
		let command = message.command();
		match command {
			VERSION => body::<VersionBody>(message).map(|b| Inbound::Version { version: b.version }),
			CREATABLE_TYPES => {
				body::<CreatableTypesBody>(message).map(|b| Inbound::CreatableTypes { types: b.types })
			}
			ROOT => body::<RootBody>(message).map(|b| Inbound::Root {
				identifier: b.identifier,
				type_info: b.type_info,
				data: b.data,
			}),
			OBJECT_RESET => body::<ObjectResetBody>(message).map(|b| Inbound::ObjectReset {
				identifier: b.identifier,
				data: b.data,
			}),
			EMIT => body::<EmitBody>(message).map(|b| Inbound::Emit {
				identifier: b.identifier,
				method: b.method,
				parameters: b.parameters,
			}),
			other => Err(DecodeError::UnknownCommand(other.to_string())),
		}
	}
}

fn body<T: serde::de::DeserializeOwned>(message: &Message) -> Result<T, DecodeError> {
	serde_json::from_value(message.to_value()).map_err(|e| DecodeError::Malformed {
		command: message.command().to_string(),
		reason: e.to_string(),
	})
}

/// Commands sent to the peer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command")]
pub enum Outbound {
	#[serde(rename = "INVOKE")]
	Invoke {
		identifier: String,
		method: String,
		parameters: Vec<Value>,
	},
	#[serde(rename = "OBJECT_REF")]
	ObjectRef { identifier: String },
	#[serde(rename = "OBJECT_DEREF")]
	ObjectDeref { identifier: String },
	#[serde(rename = "OBJECT_QUERY")]
	ObjectQuery { identifier: String },
	#[serde(rename = "OBJECT_CREATE")]
	ObjectCreate {
		#[serde(rename = "typeName")]
		type_name: String,
		identifier: String,
	},
}

impl Outbound {
	pub fn identifier(&self) -> &str {
		match self {
			Outbound::Invoke { identifier, .. }
			| Outbound::ObjectRef { identifier }
			| Outbound::ObjectDeref { identifier }
			| Outbound::ObjectQuery { identifier }
			| Outbound::ObjectCreate { identifier, .. } => identifier,
		}
	}

	pub fn to_value(&self) -> Result<Value, serde_json::Error> {
		serde_json::to_value(self)
	}
}
