//! Error types for the qbridge runtime.

use qbridge_protocol::FrameError;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a connection or using its objects.
#[derive(Debug, Clone, Error)]
pub enum Error {
	/// The byte stream could not be split into messages.
	#[error("Framing error: {0}")]
	Framing(String),

	/// A handshake command arrived after the handshake completed.
	#[error("Protocol order error: {0}")]
	ProtocolOrder(String),

	/// The peer sent a command this side does not understand.
	#[error("Unknown command: {0}")]
	UnknownCommand(String),

	/// A known command with missing or mistyped fields.
	#[error("Malformed {command} message: {reason}")]
	MalformedMessage { command: String, reason: String },

	/// A synchronous wait was not satisfied in time.
	#[error("Timeout after {timeout_ms}ms waiting for {waiting_for}")]
	Timeout { waiting_for: String, timeout_ms: u64 },

	/// Transport-level failure.
	#[error("Transport error: {0}")]
	Transport(String),

	/// The connection is closed; carries the reason it was closed.
	#[error("Connection closed: {0}")]
	ConnectionClosed(String),

	/// No live object with this identifier.
	#[error("Object not found: {0}")]
	ObjectNotFound(String),

	/// The type name is not known to this connection.
	#[error("Unknown type: {0}")]
	UnknownType(String),

	#[error("{type_name} has no property '{property}'")]
	UnknownProperty { type_name: String, property: String },

	#[error("{type_name} has no method '{method}'")]
	UnknownMethod { type_name: String, method: String },

	/// The property has no setter method.
	#[error("Property '{property}' of {type_name} is read-only")]
	ReadOnlyProperty { type_name: String, property: String },

	/// Invalid argument provided to a method or operation.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	#[error("I/O error: {0}")]
	Io(String),

	#[error("JSON error: {0}")]
	Json(String),
}

impl Error {
	/// Returns true for errors that close the connection.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			Error::Framing(_)
				| Error::ProtocolOrder(_)
				| Error::UnknownCommand(_)
				| Error::MalformedMessage { .. }
				| Error::Timeout { .. }
				| Error::Transport(_)
				| Error::Io(_)
		)
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout { .. })
	}

	/// Returns true if the connection is closed.
	pub fn is_closed(&self) -> bool {
		matches!(self, Error::ConnectionClosed(_))
	}
}

impl From<FrameError> for Error {
	fn from(err: FrameError) -> Self {
		Error::Framing(err.to_string())
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Error::Io(err.to_string())
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Json(err.to_string())
	}
}

impl From<qbridge_protocol::DecodeError> for Error {
	fn from(err: qbridge_protocol::DecodeError) -> Self {
		match err {
			qbridge_protocol::DecodeError::UnknownCommand(command) => Error::UnknownCommand(command),
			qbridge_protocol::DecodeError::Malformed { command, reason } => {
				Error::MalformedMessage { command, reason }
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fatal_classification() {
		assert!(Error::Framing("bad header".into()).is_fatal());
		assert!(Error::UnknownCommand("NOPE".into()).is_fatal());
		assert!(
			Error::Timeout {
				waiting_for: "VERSION".into(),
				timeout_ms: 5000
			}
			.is_fatal()
		);
		assert!(!Error::ObjectNotFound("x".into()).is_fatal());
		assert!(!Error::ConnectionClosed("done".into()).is_fatal());
	}

	#[test]
	fn test_decode_error_conversion() {
		let err: Error = qbridge_protocol::DecodeError::UnknownCommand("SUBSCRIBE".into()).into();
		assert!(matches!(err, Error::UnknownCommand(ref c) if c == "SUBSCRIBE"));
	}
}
