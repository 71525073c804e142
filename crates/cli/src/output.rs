//! Result envelopes and event lines written to stdout.
//!
//! Every command ends with exactly one envelope:
//!
//! ```json
//! { "ok": true, "command": "inspect", "data": { ... }, "timings": { "durationMs": 12 } }
//! ```
//!
//! A failed command carries `error: { code, message }` instead of `data`. `watch`
//! writes one line per observed event ahead of its envelope.

use std::io::{self, Write};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Indented JSON
	#[default]
	Json,
	/// Compact JSON, one document per line
	Ndjson,
	/// Plain text for terminals
	Text,
}

/// Stable, machine-matchable failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	InvalidConfig,
	LaunchFailed,
	ProtocolError,
	Timeout,
	ConnectionClosed,
	InternalError,
}

impl ErrorCode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::InvalidConfig => "INVALID_CONFIG",
			Self::LaunchFailed => "LAUNCH_FAILED",
			Self::ProtocolError => "PROTOCOL_ERROR",
			Self::Timeout => "TIMEOUT",
			Self::ConnectionClosed => "CONNECTION_CLOSED",
			Self::InternalError => "INTERNAL_ERROR",
		}
	}
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
}

impl std::fmt::Display for CommandError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Error [{}]: {}", self.code, self.message)
	}
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
	pub duration_ms: u64,
}

/// Measures a command from the moment it is dispatched.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch(Instant);

impl Stopwatch {
	pub fn start() -> Self {
		Self(Instant::now())
	}

	pub fn timings(&self) -> Timings {
		let elapsed = self.0.elapsed().as_millis();
		Timings {
			duration_ms: u64::try_from(elapsed).unwrap_or(u64::MAX),
		}
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
	pub timings: Timings,
}

impl<T: Serialize> CommandResult<T> {
	pub fn success(command: &str, data: T, clock: Stopwatch) -> Self {
		Self {
			ok: true,
			command: command.to_string(),
			data: Some(data),
			error: None,
			timings: clock.timings(),
		}
	}
}

impl CommandResult<()> {
	pub fn failure(command: &str, error: CommandError, clock: Stopwatch) -> Self {
		Self {
			ok: false,
			command: command.to_string(),
			data: None,
			error: Some(error),
			timings: clock.timings(),
		}
	}
}

fn write_json(out: &mut impl Write, value: &impl Serialize, pretty: bool) -> io::Result<()> {
	let encoded = if pretty {
		serde_json::to_string_pretty(value)
	} else {
		serde_json::to_string(value)
	};
	match encoded {
		Ok(line) => writeln!(out, "{line}"),
		Err(e) => {
			tracing::error!(error = %e, "Failed to encode output");
			Ok(())
		}
	}
}

pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) {
	let mut stdout = io::stdout().lock();
	let written = match (format, &result.data, &result.error) {
		(OutputFormat::Json, ..) => write_json(&mut stdout, result, true),
		(OutputFormat::Ndjson, ..) => write_json(&mut stdout, result, false),
		(OutputFormat::Text, Some(data), _) => write_json(&mut stdout, data, true),
		(OutputFormat::Text, None, Some(error)) => writeln!(stdout, "{error}"),
		(OutputFormat::Text, None, None) => Ok(()),
	};
	if let Err(e) = written.and_then(|()| stdout.flush()) {
		tracing::debug!(error = %e, "stdout closed");
	}
}

/// Writes one streamed `watch` event and flushes so consumers see it immediately.
pub fn print_event(event: &Value, format: OutputFormat) {
	let mut stdout = io::stdout().lock();
	let written = match format {
		OutputFormat::Text => writeln!(stdout, "{}", event_text(event)),
		OutputFormat::Json | OutputFormat::Ndjson => write_json(&mut stdout, event, false),
	};
	if let Err(e) = written.and_then(|()| stdout.flush()) {
		tracing::debug!(error = %e, "stdout closed");
	}
}

fn event_text(event: &Value) -> String {
	let name = event["name"].as_str().unwrap_or_default();
	match event["kind"].as_str() {
		Some("property") => format!("{name} = {}", event["value"]),
		Some("signal") => format!("{name}{}", event["args"]),
		_ => event.to_string(),
	}
}

pub fn print_error_stderr(error: &CommandError) {
	eprintln!("{error}");
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn success_envelope() {
		let result = CommandResult::success("types", json!([1, 2]), Stopwatch::start());
		let value = serde_json::to_value(&result).unwrap();
		assert_eq!(value["ok"], true);
		assert_eq!(value["command"], "types");
		assert_eq!(value["data"], json!([1, 2]));
		assert!(value.get("error").is_none());
		assert!(value["timings"]["durationMs"].is_u64());
	}

	#[test]
	fn failure_envelope() {
		let error = CommandError {
			code: ErrorCode::Timeout,
			message: "waited too long".to_string(),
		};
		let result = CommandResult::failure("inspect", error, Stopwatch::start());
		let value = serde_json::to_value(&result).unwrap();
		assert_eq!(value["ok"], false);
		assert_eq!(value["error"]["code"], "TIMEOUT");
		assert!(value.get("data").is_none());
	}

	#[test]
	fn error_line() {
		let error = CommandError {
			code: ErrorCode::LaunchFailed,
			message: "no such file".to_string(),
		};
		assert_eq!(error.to_string(), "Error [LAUNCH_FAILED]: no such file");
	}

	#[test]
	fn event_text_forms() {
		assert_eq!(
			event_text(&json!({"kind": "property", "name": "title", "value": "x"})),
			"title = \"x\""
		);
		assert_eq!(
			event_text(&json!({"kind": "signal", "name": "greeted", "args": ["bob", 2]})),
			"greeted[\"bob\",2]"
		);
	}
}
