use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "qbridge")]
#[command(about = "Inspect and watch qbridge backends from the command line")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: json (default), ndjson, or text
	#[arg(short = 'f', long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	/// Client options as JSON (connection and list settings)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Synchronous wait timeout in milliseconds, overriding the config file
	#[arg(long, global = true, value_name = "MS")]
	pub timeout_ms: Option<u64>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Print the protocol version, creatable types and root object
	Inspect {
		/// Also load list models referenced by the root and report their size
		#[arg(long)]
		models: bool,

		#[command(flatten)]
		backend: BackendArgs,
	},

	/// Print the types the backend lets clients instantiate
	Types {
		#[command(flatten)]
		backend: BackendArgs,
	},

	/// Stream root property changes and signals until the backend exits
	Watch {
		/// Stop after this many events
		#[arg(long, value_name = "N")]
		max_events: Option<usize>,

		#[command(flatten)]
		backend: BackendArgs,
	},
}

#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
	/// Backend program and its arguments, after `--`
	#[arg(last = true, required = true, value_name = "BACKEND")]
	pub command: Vec<String>,
}

impl BackendArgs {
	pub fn program(&self) -> &str {
		self.command.first().map(String::as_str).unwrap_or_default()
	}

	pub fn args(&self) -> &[String] {
		self.command.get(1..).unwrap_or_default()
	}
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Inspect { .. } => "inspect",
			Commands::Types { .. } => "types",
			Commands::Watch { .. } => "watch",
		}
	}

	pub fn backend(&self) -> &BackendArgs {
		match self {
			Commands::Inspect { backend, .. } | Commands::Types { backend } | Commands::Watch { backend, .. } => backend,
		}
	}
}
