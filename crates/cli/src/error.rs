use std::io::Write;

use thiserror::Error;
use tracing::{debug, error};

/// Exit status for a local user abort.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Exec(#[from] pi::Error),

	#[error("{0:#}")]
	Config(anyhow::Error),

	#[error("{0}")]
	Usage(String),
}

impl CliError {
	/// Process exit status for this failure.
	pub fn exit_code(&self) -> i32 {
		match self {
			CliError::Exec(pi::Error::RemoteExitNonZero { code }) => *code,
			CliError::Exec(pi::Error::Interrupted) => INTERRUPTED_EXIT_CODE,
			_ => 1,
		}
	}

	/// Failures the user already saw through the remote's own output.
	pub fn is_silent(&self) -> bool {
		matches!(
			self,
			CliError::Exec(pi::Error::RemoteExitNonZero { .. } | pi::Error::Interrupted)
		)
	}

	/// Logs the failure, prints the user-facing line to `out` unless silent,
	/// and returns the exit status.
	pub fn report(&self, out: &mut impl Write) -> i32 {
		let code = self.exit_code();
		if self.is_silent() {
			debug!(target = "pi", error = %self, code, "command failed");
		} else {
			error!(target = "pi", error = %self, code, "command failed");
			let _ = writeln!(out, "error: {self}");
		}
		code
	}
}

impl From<pi_runtime::Error> for CliError {
	fn from(err: pi_runtime::Error) -> Self {
		CliError::Exec(err.into())
	}
}

pub type Result<T> = std::result::Result<T, CliError>;
