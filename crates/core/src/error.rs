use std::io;

use thiserror::Error;

/// Errors raised while running an exec session.
#[derive(Debug, Error)]
pub enum Error {
	/// The remote could not be reached.
	#[error("transport error: {0}")]
	Transport(#[source] pi_runtime::Error),

	/// The remote answered with an unexpected status or an unusable body.
	#[error("protocol error: {0}")]
	Protocol(String),

	/// The exec-create call did not answer "created".
	#[error("failed to create exec session (status {status}): {body}")]
	SessionCreate { status: u16, body: String },

	/// A read or write failure while relaying the session streams.
	#[error("stream error: {0}")]
	Stream(#[from] io::Error),

	#[error("terminal mode error: {0}")]
	TerminalMode(String),

	/// The remote command ran and exited with a non-zero status.
	#[error("command terminated with non-zero exit code: {code}")]
	RemoteExitNonZero { code: i32 },

	#[error("{0}")]
	InvalidInput(String),

	#[error("interrupted")]
	Interrupted,
}

impl Error {
	/// Exit code the local process should mirror, if the remote command failed.
	pub fn remote_exit_code(&self) -> Option<i32> {
		match self {
			Error::RemoteExitNonZero { code } => Some(*code),
			_ => None,
		}
	}
}

impl From<pi_runtime::Error> for Error {
	fn from(err: pi_runtime::Error) -> Self {
		match err {
			pi_runtime::Error::UnexpectedStatus { .. } | pi_runtime::Error::MalformedResponse(_) | pi_runtime::Error::Json(_) => {
				Error::Protocol(err.to_string())
			}
			other => Error::Transport(other),
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
