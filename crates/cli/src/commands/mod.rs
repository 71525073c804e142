mod inspect;
mod types;
mod watch;

use qbridge::Object;
use serde_json::Value;

use crate::cli::{Cli, Commands};
use crate::config;
use crate::error::Result;
use crate::output::{CommandResult, Stopwatch, print_result};

pub use inspect::{InspectData, ModelSummary, ObjectSummary};
pub use watch::WatchSummary;

/// Runs the parsed command and prints its envelope. `clock` times the whole run.
pub async fn dispatch(cli: Cli, clock: Stopwatch) -> Result<()> {
	let format = cli.format;
	let options = config::load(cli.config.as_deref(), cli.timeout_ms)?;
	let name = cli.command.name();
	let backend = cli.command.backend().clone();
	tracing::debug!(command = name, program = backend.program(), "Dispatching");

	match cli.command {
		Commands::Inspect { models, .. } => {
			let data = inspect::run(&backend, options, models).await?;
			print_result(&CommandResult::success(name, data, clock), format);
		}
		Commands::Types { .. } => {
			let data = types::run(&backend, options).await?;
			print_result(&CommandResult::success(name, data, clock), format);
		}
		Commands::Watch { max_events, .. } => {
			let data = watch::run(&backend, options, max_events, format).await?;
			print_result(&CommandResult::success(name, data, clock), format);
		}
	}
	Ok(())
}

/// Summary of an object's schema and current snapshot.
pub(crate) fn summarize(object: &Object) -> Result<ObjectSummary> {
	let schema = object.schema();
	Ok(ObjectSummary {
		identifier: object.identifier().to_string(),
		type_name: object.type_name().to_string(),
		properties: Value::Object(object.snapshot()?),
		methods: schema.methods().map(|m| m.name.clone()).collect(),
		signals: schema.signals().map(|s| s.name.clone()).collect(),
	})
}
