use qbridge::{ClientOptions, TypeDescriptor};

use crate::cli::BackendArgs;
use crate::error::Result;
use crate::session::with_client;

pub async fn run(backend: &BackendArgs, options: ClientOptions) -> Result<Vec<TypeDescriptor>> {
	with_client(backend, options, |client| {
		let types = client.creatable_types()?;
		tracing::info!(count = types.len(), "Received creatable types");
		Ok(types)
	})
	.await
}
