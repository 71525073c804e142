//! Backend process management.
//!
//! A backend is any program that speaks the protocol on its stdin and stdout. Its
//! stderr is passed through so backend diagnostics stay visible.

use std::process::Stdio;
use std::time::Duration;

use qbridge_runtime::PipeTransport;
use tokio::process::{Child, Command};

use crate::cli::BackendArgs;
use crate::error::{CliError, Result};

/// How long a killed backend gets to exit before it is abandoned.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// A running backend process.
#[derive(Debug)]
pub struct Backend {
	process: Child,
	program: String,
}

impl Backend {
	/// Spawns the backend with piped stdin and stdout.
	///
	/// # Errors
	///
	/// Returns [`CliError::Launch`] if the process cannot be spawned or exits
	/// before it could be talked to.
	pub fn launch(args: &BackendArgs) -> Result<Self> {
		let program = args.program();
		if program.is_empty() {
			return Err(CliError::Launch("no backend command given".to_string()));
		}

		let mut process = Command::new(program)
			.args(args.args())
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| CliError::Launch(format!("failed to spawn {program}: {e}")))?;

		// A backend that already finished cleanly may still have output to read.
		match process.try_wait() {
			Ok(Some(status)) if !status.success() => {
				return Err(CliError::Launch(format!("{program} exited immediately with {status}")));
			}
			Ok(_) => {}
			Err(e) => {
				return Err(CliError::Launch(format!("failed to check {program}: {e}")));
			}
		}

		tracing::info!(program, pid = ?process.id(), "Launched backend");
		Ok(Self {
			process,
			program: program.to_string(),
		})
	}

	/// Takes the process stdio and wraps it in a transport.
	///
	/// Must be called from within the tokio runtime.
	pub fn transport(&mut self) -> Result<PipeTransport> {
		let stdin = self
			.process
			.stdin
			.take()
			.ok_or_else(|| CliError::Launch("backend stdin already taken".to_string()))?;
		let stdout = self
			.process
			.stdout
			.take()
			.ok_or_else(|| CliError::Launch("backend stdout already taken".to_string()))?;
		Ok(PipeTransport::new(stdin, stdout)?)
	}

	/// Stops the backend, killing it if it has not exited on its own.
	pub async fn shutdown(mut self) -> Result<()> {
		if let Ok(Some(status)) = self.process.try_wait() {
			tracing::debug!(program = %self.program, %status, "Backend already exited");
			return Ok(());
		}

		#[cfg(windows)]
		{
			drop(self.process.stdin.take());
			drop(self.process.stdout.take());
		}

		self.process
			.start_kill()
			.map_err(|e| CliError::Launch(format!("failed to kill {}: {e}", self.program)))?;
		match tokio::time::timeout(EXIT_GRACE, self.process.wait()).await {
			Ok(Ok(status)) => {
				tracing::debug!(program = %self.program, %status, "Backend stopped");
			}
			Ok(Err(e)) => {
				tracing::warn!(program = %self.program, error = %e, "Failed to reap backend");
			}
			Err(_) => {
				tracing::warn!(program = %self.program, "Backend did not exit after kill");
			}
		}
		Ok(())
	}
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;

	fn backend(command: &[&str]) -> BackendArgs {
		BackendArgs {
			command: command.iter().map(|s| s.to_string()).collect(),
		}
	}

	#[tokio::test]
	async fn launch_and_shutdown() {
		let mut backend = Backend::launch(&backend(&["cat"])).unwrap();
		let _transport = backend.transport().unwrap();
		assert!(backend.transport().is_err());
		backend.shutdown().await.unwrap();
	}

	#[tokio::test]
	async fn missing_program() {
		let err = Backend::launch(&backend(&["/nonexistent/qbridge-backend"])).unwrap_err();
		assert!(matches!(err, CliError::Launch(_)));
	}
}
