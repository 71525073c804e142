//! Runs a command body against a client connected to a freshly launched backend.

use qbridge::{Client, ClientOptions};

use crate::backend::Backend;
use crate::cli::BackendArgs;
use crate::error::{CliError, Result};

/// Launches the backend, connects a client and runs `body` on a blocking thread.
///
/// The connection is driven synchronously, so `body` runs under
/// `spawn_blocking` while the transport's I/O tasks run on the async runtime. The
/// backend is stopped afterwards whether or not `body` succeeded.
pub async fn with_client<T, F>(args: &BackendArgs, options: ClientOptions, body: F) -> Result<T>
where
	T: Send + 'static,
	F: FnOnce(&Client) -> Result<T> + Send + 'static,
{
	let mut backend = Backend::launch(args)?;
	let transport = match backend.transport() {
		Ok(transport) => transport,
		Err(e) => {
			backend.shutdown().await?;
			return Err(e);
		}
	};

	let outcome = tokio::task::spawn_blocking(move || {
		let client = Client::new(Box::new(transport), options)?;
		let result = body(&client);
		client.close();
		result
	})
	.await
	.map_err(|e| CliError::Anyhow(anyhow::anyhow!("command thread failed: {e}")));

	backend.shutdown().await?;
	outcome?
}
