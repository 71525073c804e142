//! Byte-stream transports.
//!
//! The connection is driven synchronously: it reads whatever bytes are available,
//! blocks in [`Transport::wait_for_ready_read`] while a synchronous wait is outstanding,
//! and writes complete frames. [`PipeTransport`] bridges that model onto a pair of
//! tokio streams (child process stdio, sockets, or `tokio::io::duplex` in tests) by
//! running the actual I/O on background tasks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

const READ_CHUNK: usize = 32 * 1024;

/// Longest a blocked reader goes without re-checking the writer.
const WRITER_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// A reliable, in-order byte stream to the peer.
pub trait Transport: Send {
	/// Appends every byte that can be read without blocking to `buf`.
	///
	/// Returns the number of bytes appended.
	fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize>;

	/// Queues `bytes` for delivery to the peer.
	fn write(&mut self, bytes: &[u8]) -> Result<()>;

	/// Returns false once the stream has ended or been closed.
	fn is_open(&self) -> bool;

	/// Blocks up to `timeout` until bytes are available or the stream ends.
	///
	/// Returns `Ok(false)` if the timeout elapsed with nothing to read.
	fn wait_for_ready_read(&mut self, timeout: Duration) -> Result<bool>;

	/// Blocks up to `timeout` until queued writes have been handed to the stream.
	fn flush(&mut self, _timeout: Duration) -> Result<()> {
		Ok(())
	}

	/// Reports a failure hit in the background, such as a write that could not be
	/// delivered after [`write`](Self::write) returned.
	fn check(&self) -> Result<()> {
		Ok(())
	}

	/// Closes the stream. Further writes fail.
	fn close(&mut self);
}

/// Progress of the background writer.
#[derive(Default)]
struct WriterState {
	/// Chunks queued but not yet written.
	outstanding: usize,
	failure: Option<String>,
}

#[derive(Default)]
struct WriterStatus {
	state: Mutex<WriterState>,
	changed: Condvar,
}

impl WriterStatus {
	fn failure(&self) -> Option<Error> {
		self.state.lock().failure.clone().map(Error::Transport)
	}

	fn queued(&self) {
		self.state.lock().outstanding += 1;
	}

	fn written(&self) {
		let mut state = self.state.lock();
		state.outstanding = state.outstanding.saturating_sub(1);
		self.changed.notify_all();
	}

	fn failed(&self, reason: String) {
		let mut state = self.state.lock();
		state.failure = Some(reason);
		state.outstanding = 0;
		self.changed.notify_all();
	}
}

/// Transport over a pair of async streams.
///
/// Reading and writing run on tasks spawned onto the current tokio runtime. The
/// transport itself must be used from a blocking context (a plain thread or
/// `tokio::task::spawn_blocking`), since waiting for input blocks the calling thread.
/// A failed write closes the transport and is reported by the next read, wait or
/// flush as [`Error::Transport`].
pub struct PipeTransport {
	inbound: std_mpsc::Receiver<Vec<u8>>,
	ready: VecDeque<Vec<u8>>,
	outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
	open: Arc<AtomicBool>,
	writer: Arc<WriterStatus>,
	reader: JoinHandle<()>,
}

impl PipeTransport {
	/// Creates a transport writing to `stdin` and reading from `stdout`.
	///
	/// # Errors
	///
	/// Returns [`Error::Transport`] if called outside a tokio runtime.
	pub fn new<W, R>(stdin: W, stdout: R) -> Result<Self>
	where
		W: AsyncWrite + Unpin + Send + 'static,
		R: AsyncRead + Unpin + Send + 'static,
	{
		let handle = tokio::runtime::Handle::try_current()
			.map_err(|e| Error::Transport(format!("PipeTransport requires a tokio runtime: {e}")))?;

		let open = Arc::new(AtomicBool::new(true));
		let writer = Arc::new(WriterStatus::default());
		let (inbound_tx, inbound) = std_mpsc::channel();
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

		let reader = handle.spawn(read_loop(stdout, inbound_tx));
		// The writer finishes on its own once the sender is dropped and the queue drained.
		drop(handle.spawn(write_loop(
			stdin,
			outbound_rx,
			Arc::clone(&open),
			Arc::clone(&writer),
		)));

		Ok(Self {
			inbound,
			ready: VecDeque::new(),
			outbound: Some(outbound_tx),
			open,
			writer,
			reader,
		})
	}

	fn mark_closed(&self) {
		self.open.store(false, Ordering::SeqCst);
	}
}

/// Forwards chunks until end of stream. Dropping `tx` is the end-of-stream signal, so
/// the consumer sees it only after draining every chunk sent before it.
async fn read_loop<R>(mut stdout: R, tx: std_mpsc::Sender<Vec<u8>>)
where
	R: AsyncRead + Unpin,
{
	let mut buf = vec![0u8; READ_CHUNK];
	loop {
		match stdout.read(&mut buf).await {
			Ok(0) => {
				tracing::debug!("Transport reached end of stream");
				break;
			}
			Ok(n) => {
				if tx.send(buf[..n].to_vec()).is_err() {
					break;
				}
			}
			Err(e) => {
				tracing::error!(error = %e, "Transport read error");
				break;
			}
		}
	}
}

async fn write_loop<W>(
	mut stdin: W,
	mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
	open: Arc<AtomicBool>,
	status: Arc<WriterStatus>,
) where
	W: AsyncWrite + Unpin,
{
	while let Some(bytes) = rx.recv().await {
		let result = async {
			stdin.write_all(&bytes).await?;
			stdin.flush().await
		}
		.await;
		match result {
			Ok(()) => status.written(),
			Err(e) => {
				tracing::error!(error = %e, "Transport write error");
				open.store(false, Ordering::SeqCst);
				status.failed(format!("write failed: {e}"));
				return;
			}
		}
	}
	let _ = stdin.shutdown().await;
}

impl Transport for PipeTransport {
	fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
		self.check()?;
		let mut total = 0;
		while let Some(chunk) = self.ready.pop_front() {
			total += chunk.len();
			buf.extend_from_slice(&chunk);
		}
		loop {
			match self.inbound.try_recv() {
				Ok(chunk) => {
					total += chunk.len();
					buf.extend_from_slice(&chunk);
				}
				Err(std_mpsc::TryRecvError::Empty) => break,
				Err(std_mpsc::TryRecvError::Disconnected) => {
					self.mark_closed();
					break;
				}
			}
		}
		Ok(total)
	}

	fn write(&mut self, bytes: &[u8]) -> Result<()> {
		self.check()?;
		if !self.is_open() {
			return Err(Error::Transport("write to closed transport".to_string()));
		}
		let sender = self
			.outbound
			.as_ref()
			.ok_or_else(|| Error::Transport("write to closed transport".to_string()))?;
		self.writer.queued();
		sender.send(bytes.to_vec()).map_err(|_| {
			self.writer.failed("writer task has stopped".to_string());
			Error::Transport("writer task has stopped".to_string())
		})
	}

	fn is_open(&self) -> bool {
		self.open.load(Ordering::SeqCst)
	}

	fn wait_for_ready_read(&mut self, timeout: Duration) -> Result<bool> {
		if !self.ready.is_empty() {
			return Ok(true);
		}
		let deadline = Instant::now() + timeout;
		loop {
			self.check()?;
			let remaining = deadline.saturating_duration_since(Instant::now());
			match self.inbound.recv_timeout(remaining.min(WRITER_CHECK_INTERVAL)) {
				Ok(chunk) => {
					self.ready.push_back(chunk);
					return Ok(true);
				}
				Err(std_mpsc::RecvTimeoutError::Timeout) if remaining <= WRITER_CHECK_INTERVAL => {
					return Ok(false);
				}
				Err(std_mpsc::RecvTimeoutError::Timeout) => {}
				Err(std_mpsc::RecvTimeoutError::Disconnected) => {
					self.mark_closed();
					return Ok(true);
				}
			}
		}
	}

	fn flush(&mut self, timeout: Duration) -> Result<()> {
		let deadline = Instant::now() + timeout;
		let mut state = self.writer.state.lock();
		loop {
			if let Some(reason) = &state.failure {
				return Err(Error::Transport(reason.clone()));
			}
			if state.outstanding == 0 {
				return Ok(());
			}
			if self.writer.changed.wait_until(&mut state, deadline).timed_out() {
				return Err(Error::Timeout {
					waiting_for: "queued writes".to_string(),
					timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
				});
			}
		}
	}

	fn check(&self) -> Result<()> {
		match self.writer.failure() {
			Some(error) => Err(error),
			None => Ok(()),
		}
	}

	fn close(&mut self) {
		self.mark_closed();
		// Dropping the sender lets the writer drain what is queued, then shut down.
		self.outbound.take();
		self.reader.abort();
	}
}

impl Drop for PipeTransport {
	fn drop(&mut self) {
		self.reader.abort();
	}
}
