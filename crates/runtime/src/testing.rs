//! In-memory transport for driving a connection from tests.
//!
//! [`memory_transport`] returns the connection side ([`MemoryTransport`]) and a
//! [`PeerHandle`] that plays the backend: it queues framed messages for the
//! connection to read, records every frame the connection writes, and can answer
//! writes automatically. Nothing ever sleeps; with an empty inbound buffer
//! [`Transport::wait_for_ready_read`] reports "not ready" at once, so a wait that the
//! peer cannot satisfy times out immediately.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use qbridge_protocol::{FrameDecoder, encode};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Computes replies to a frame written by the connection.
pub type Responder = Box<dyn FnMut(&Value) -> Vec<Value> + Send>;

#[derive(Default)]
struct Shared {
	inbound: VecDeque<u8>,
	written: FrameDecoder,
	sent: Vec<Value>,
	responder: Option<Responder>,
	chunk_size: Option<usize>,
	closed: bool,
	/// Set by [`PeerHandle::break_writes`].
	write_failure: Option<String>,
}

/// Connection side of an in-memory transport.
pub struct MemoryTransport {
	shared: Arc<Mutex<Shared>>,
}

/// Peer side of an in-memory transport.
#[derive(Clone)]
pub struct PeerHandle {
	shared: Arc<Mutex<Shared>>,
}

/// Creates a connected transport and peer handle.
pub fn memory_transport() -> (MemoryTransport, PeerHandle) {
	let shared = Arc::new(Mutex::new(Shared::default()));
	(
		MemoryTransport {
			shared: Arc::clone(&shared),
		},
		PeerHandle { shared },
	)
}

impl PeerHandle {
	/// Queues one framed message for the connection.
	pub fn send(&self, message: Value) {
		let bytes = encode(&message).unwrap_or_default();
		self.send_raw(&bytes);
	}

	pub fn send_all(&self, messages: impl IntoIterator<Item = Value>) {
		for message in messages {
			self.send(message);
		}
	}

	/// Queues raw bytes, framed or not.
	pub fn send_raw(&self, bytes: &[u8]) {
		self.shared.lock().inbound.extend(bytes.iter().copied());
	}

	/// Everything the connection has written, decoded.
	pub fn sent(&self) -> Vec<Value> {
		self.shared.lock().sent.clone()
	}

	/// Drains the written frames.
	pub fn take_sent(&self) -> Vec<Value> {
		std::mem::take(&mut self.shared.lock().sent)
	}

	/// The `command` of every written frame.
	pub fn sent_commands(&self) -> Vec<String> {
		self.sent()
			.iter()
			.filter_map(|v| v.get("command").and_then(Value::as_str).map(str::to_string))
			.collect()
	}

	/// Answers every frame the connection writes with the messages `responder` returns.
	pub fn respond_with<F>(&self, responder: F)
	where
		F: FnMut(&Value) -> Vec<Value> + Send + 'static,
	{
		self.shared.lock().responder = Some(Box::new(responder));
	}

	/// Limits how many bytes one read hands to the connection.
	pub fn set_chunk_size(&self, size: usize) {
		self.shared.lock().chunk_size = Some(size.max(1));
	}

	/// Bytes queued but not yet read by the connection.
	pub fn unread(&self) -> usize {
		self.shared.lock().inbound.len()
	}

	/// Makes later writes vanish as if the pipe broke after accepting them.
	///
	/// Writes keep succeeding; the failure is reported by [`Transport::check`].
	pub fn break_writes(&self, reason: &str) {
		self.shared.lock().write_failure = Some(reason.to_string());
	}

	/// Ends the stream. Bytes already queued can still be read.
	pub fn close(&self) {
		self.shared.lock().closed = true;
	}
}

impl Transport for MemoryTransport {
	fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
		let mut shared = self.shared.lock();
		let count = match shared.chunk_size {
			Some(size) => size.min(shared.inbound.len()),
			None => shared.inbound.len(),
		};
		buf.extend(shared.inbound.drain(..count));
		Ok(count)
	}

	fn write(&mut self, bytes: &[u8]) -> Result<()> {
		let (frames, responder) = {
			let mut shared = self.shared.lock();
			if shared.closed {
				return Err(Error::Transport("write to closed transport".to_string()));
			}
			if shared.write_failure.is_some() {
				return Ok(());
			}
			shared.written.push(bytes);
			let frames = shared
				.written
				.drain()
				.map_err(|e| Error::Transport(format!("connection wrote a bad frame: {e}")))?;
			let frames: Vec<Value> = frames.into_iter().map(|m| m.into_value()).collect();
			shared.sent.extend(frames.iter().cloned());
			(frames, shared.responder.take())
		};

		// The responder runs unlocked so it may use the peer handle.
		let Some(mut responder) = responder else {
			return Ok(());
		};
		let replies: Vec<Value> = frames.iter().flat_map(|frame| responder(frame)).collect();
		let mut shared = self.shared.lock();
		if shared.responder.is_none() {
			shared.responder = Some(responder);
		}
		for reply in replies {
			if let Ok(bytes) = encode(&reply) {
				shared.inbound.extend(bytes);
			}
		}
		Ok(())
	}

	fn is_open(&self) -> bool {
		let shared = self.shared.lock();
		!(shared.closed && shared.inbound.is_empty())
	}

	fn wait_for_ready_read(&mut self, _timeout: Duration) -> Result<bool> {
		let shared = self.shared.lock();
		Ok(!shared.inbound.is_empty() || shared.closed)
	}

	fn check(&self) -> Result<()> {
		match &self.shared.lock().write_failure {
			Some(reason) => Err(Error::Transport(reason.clone())),
			None => Ok(()),
		}
	}

	fn close(&mut self) {
		self.shared.lock().closed = true;
	}
}
