//! Client options from `--config` and command-line overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use qbridge::ClientOptions;

use crate::error::{CliError, Result};

/// Reads options from `path` if given, then applies `timeout_ms`.
///
/// Keys missing from the file keep their defaults.
pub fn load(path: Option<&Path>, timeout_ms: Option<u64>) -> Result<ClientOptions> {
	let mut options = match path {
		Some(path) => {
			let text = std::fs::read_to_string(path)
				.with_context(|| format!("reading config {}", path.display()))?;
			serde_json::from_str::<ClientOptions>(&text)
				.map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?
		}
		None => ClientOptions::default(),
	};

	if let Some(ms) = timeout_ms {
		if ms == 0 {
			return Err(CliError::Config("--timeout-ms must be positive".to_string()));
		}
		options.connection = options.connection.wait_timeout(Duration::from_millis(ms));
	}
	tracing::debug!(?options, "Loaded client options");
	Ok(options)
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn defaults_without_file() {
		let options = load(None, None).unwrap();
		assert_eq!(options, ClientOptions::default());
	}

	#[test]
	fn partial_file_and_override() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{"list": {{"batchSize": 50}}, "connection": {{"waitTimeoutMs": 900}}}}"#).unwrap();

		let options = load(Some(file.path()), None).unwrap();
		assert_eq!(options.list.batch_size, 50);
		assert_eq!(options.list.cache_size, qbridge::options::DEFAULT_CACHE_SIZE);
		assert_eq!(options.connection.wait_timeout_ms, 900);

		let options = load(Some(file.path()), Some(40)).unwrap();
		assert_eq!(options.connection.wait_timeout_ms, 40);
	}

	#[test]
	fn rejects_bad_input() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, "not json").unwrap();
		assert!(matches!(load(Some(file.path()), None), Err(CliError::Config(_))));
		assert!(matches!(load(None, Some(0)), Err(CliError::Config(_))));
		assert!(matches!(
			load(Some(Path::new("/nonexistent/qbridge.json")), None),
			Err(CliError::Anyhow(_))
		));
	}
}
