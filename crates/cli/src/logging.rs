use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Default directives for `-v` counts.
///
/// Without flags only CLI errors show; protocol traffic needs `-vv` or `RUST_LOG`.
fn default_directives(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "error,qbridge_runtime=off,qbridge=off",
		1 => "info,qbridge_runtime=warn,qbridge=warn",
		2 => "debug",
		_ => "trace",
	}
}

/// Installs the stderr subscriber. `RUST_LOG` takes precedence over `verbosity`.
///
/// stdout stays reserved for command output.
pub fn init_logging(verbosity: u8) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));
	let ansi = std::io::stderr().is_terminal();

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr.with_max_level(tracing::Level::TRACE))
		.with_ansi(ansi)
		.with_target(verbosity > 1)
		.compact()
		.init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn directives_parse() {
		for verbosity in 0..4 {
			assert!(EnvFilter::try_new(default_directives(verbosity)).is_ok());
		}
		assert_eq!(default_directives(7), "trace");
	}
}
