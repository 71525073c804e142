use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("invalid configuration: {0}")]
	Config(String),

	#[error("backend launch failed: {0}")]
	Launch(String),

	#[error(transparent)]
	Qbridge(#[from] qbridge::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	pub fn code(&self) -> ErrorCode {
		match self {
			CliError::Config(_) => ErrorCode::InvalidConfig,
			CliError::Launch(_) => ErrorCode::LaunchFailed,
			CliError::Qbridge(e) => match e {
				qbridge::Error::Timeout { .. } => ErrorCode::Timeout,
				qbridge::Error::ConnectionClosed(_) => ErrorCode::ConnectionClosed,
				e if e.is_fatal() => ErrorCode::ProtocolError,
				_ => ErrorCode::InternalError,
			},
			CliError::Io(_) | CliError::Json(_) | CliError::Anyhow(_) => ErrorCode::InternalError,
		}
	}

	pub fn to_command_error(&self) -> CommandError {
		CommandError {
			code: self.code(),
			message: format!("{self:#}"),
		}
	}
}
