//! Stream framing for protocol messages.
//!
//! Every message on the wire is a JSON blob preceded by its decimal byte length and a
//! space, and followed by a newline that is not counted in the length:
//!
//! ```text
//! "<size> <blob of exactly size bytes>\n"
//! ```
//!
//! The blob may itself contain newlines, so the decoder never splits on them; it always
//! reads the declared byte count. Framing errors are not recoverable: once the header of
//! a frame is unreadable there is no way to find the start of the next one.

use serde_json::Value;
use thiserror::Error;

use crate::message::Message;

/// Longest accepted size header, in digits.
pub const MAX_HEADER_DIGITS: usize = 20;

/// Processed bytes are only compacted out of the buffer past this threshold.
const COMPACT_THRESHOLD: usize = 4096;

/// Fatal framing failures.
#[derive(Debug, Error)]
pub enum FrameError {
	/// The size header contains something other than ASCII digits.
	#[error("invalid frame header: {0:?}")]
	InvalidHeader(String),

	/// The size header is zero or does not fit the platform size type.
	#[error("invalid frame size: {0}")]
	InvalidSize(String),

	/// The byte after the blob was not a newline.
	#[error("frame of {size} bytes is not newline terminated (found byte {found:#04x})")]
	MissingTerminator { size: usize, found: u8 },

	/// The blob is not valid JSON.
	#[error("frame payload is not valid JSON: {0}")]
	Json(#[from] serde_json::Error),

	/// The blob is JSON but not a message object with a `command` string.
	#[error("frame payload is not a message: {0}")]
	NotAMessage(String),
}

/// Encodes one message value into its framed wire representation.
pub fn encode(message: &Value) -> Result<Vec<u8>, serde_json::Error> {
	let blob = serde_json::to_vec(message)?;
	let header = blob.len().to_string();

	let mut frame = Vec::with_capacity(header.len() + blob.len() + 2);
	frame.extend_from_slice(header.as_bytes());
	frame.push(b' ');
	frame.extend_from_slice(&blob);
	frame.push(b'\n');
	Ok(frame)
}

/// Incremental decoder for a framed byte stream.
///
/// Bytes are appended with [`push`](Self::push) in whatever chunks the transport
/// delivers them; [`next_message`](Self::next_message) yields complete messages in
/// arrival order and leaves partial frames buffered.
#[derive(Debug, Default)]
pub struct FrameDecoder {
	buffer: Vec<u8>,
	offset: usize,
}

impl FrameDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends raw bytes read from the transport.
	pub fn push(&mut self, bytes: &[u8]) {
		self.compact();
		self.buffer.extend_from_slice(bytes);
	}

	/// Number of buffered bytes not yet consumed by a complete frame.
	pub fn buffered(&self) -> usize {
		self.buffer.len() - self.offset
	}

	/// Decodes the next complete message, if one is fully buffered.
	///
	/// Returns `Ok(None)` when more bytes are needed.
	pub fn next_message(&mut self) -> Result<Option<Message>, FrameError> {
		let Some(blob) = self.next_blob()? else {
			return Ok(None);
		};
		let value: Value = serde_json::from_slice(blob)?;
		Message::from_value(value)
			.map(Some)
			.map_err(FrameError::NotAMessage)
	}

	/// Drains every complete message currently buffered.
	pub fn drain(&mut self) -> Result<Vec<Message>, FrameError> {
		let mut messages = Vec::new();
		while let Some(message) = self.next_message()? {
			messages.push(message);
		}
		Ok(messages)
	}

	fn next_blob(&mut self) -> Result<Option<&[u8]>, FrameError> {
		let remaining = &self.buffer[self.offset..];

		let header_len = match remaining.iter().position(|&b| b == b' ') {
			Some(0) => return Err(FrameError::InvalidHeader(String::new())),
			Some(len) => len,
			None => {
				// No separator yet; whatever is buffered must still be a plausible size.
				if let Some(&bad) = remaining.iter().find(|b| !b.is_ascii_digit()) {
					return Err(FrameError::InvalidHeader(lossy_header(remaining, bad)));
				}
				if remaining.len() > MAX_HEADER_DIGITS {
					return Err(FrameError::InvalidSize(lossy(remaining)));
				}
				return Ok(None);
			}
		};

		let header = &remaining[..header_len];
		if !header.iter().all(u8::is_ascii_digit) {
			return Err(FrameError::InvalidHeader(lossy(header)));
		}
		if header_len > MAX_HEADER_DIGITS {
			return Err(FrameError::InvalidSize(lossy(header)));
		}

		let size: usize = std::str::from_utf8(header)
			.ok()
			.and_then(|s| s.parse().ok())
			.ok_or_else(|| FrameError::InvalidSize(lossy(header)))?;
		if size == 0 {
			return Err(FrameError::InvalidSize("0".to_string()));
		}

		let start = header_len + 1;
		let total = start
			.checked_add(size)
			.and_then(|n| n.checked_add(1))
			.ok_or_else(|| FrameError::InvalidSize(lossy(header)))?;
		if remaining.len() < total {
			return Ok(None);
		}

		let terminator = remaining[total - 1];
		if terminator != b'\n' {
			return Err(FrameError::MissingTerminator {
				size,
				found: terminator,
			});
		}

		let begin = self.offset + start;
		self.offset += total;
		Ok(Some(&self.buffer[begin..begin + size]))
	}

	fn compact(&mut self) {
		if self.offset == 0 {
			return;
		}
		if self.offset >= self.buffer.len() {
			self.buffer.clear();
			self.offset = 0;
		} else if self.offset >= COMPACT_THRESHOLD {
			self.buffer.drain(..self.offset);
			self.offset = 0;
		}
	}
}

fn lossy(bytes: &[u8]) -> String {
	String::from_utf8_lossy(bytes).into_owned()
}

fn lossy_header(remaining: &[u8], bad: u8) -> String {
	let end = remaining
		.iter()
		.position(|&b| b == bad)
		.map_or(remaining.len(), |p| p + 1);
	lossy(&remaining[..end.min(MAX_HEADER_DIGITS + 1)])
}
