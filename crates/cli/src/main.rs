use clap::Parser;
use qbridge_cli::cli::Cli;
use qbridge_cli::error::CliError;
use qbridge_cli::output::{self, CommandResult, OutputFormat, Stopwatch};
use qbridge_cli::{commands, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let clock = Stopwatch::start();
	let format = cli.format;
	let command = cli.command.name();

	if let Err(err) = commands::dispatch(cli, clock).await {
		report_failure(&err, command, format, clock);
		std::process::exit(1);
	}
}

/// stderr always gets the error line; JSON formats also get the envelope on stdout.
fn report_failure(err: &CliError, command: &str, format: OutputFormat, clock: Stopwatch) {
	tracing::debug!(error = ?err, command, "Command failed");
	let error = err.to_command_error();
	output::print_error_stderr(&error);
	if format != OutputFormat::Text {
		output::print_result(&CommandResult::failure(command, error, clock), format);
	}
}
