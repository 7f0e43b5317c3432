use thiserror::Error;

/// Errors raised by the signed transport.
#[derive(Debug, Error)]
pub enum Error {
	/// The remote could not be reached: DNS, TCP, TLS or socket I/O failure.
	#[error("transport error: {message}")]
	Transport {
		message: String,
		#[source]
		source: Option<Box<dyn std::error::Error + Send + Sync>>,
	},

	/// The remote answered with a status the call site did not expect.
	#[error("unexpected status {status} for {method} {path}: {body}")]
	UnexpectedStatus {
		method: String,
		path: String,
		status: u16,
		body: String,
	},

	#[error("invalid host '{host}': {reason}")]
	InvalidHost { host: String, reason: String },

	#[error("malformed response: {0}")]
	MalformedResponse(String),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn transport(message: impl Into<String>) -> Self {
		Error::Transport {
			message: message.into(),
			source: None,
		}
	}

	pub fn transport_with<E>(message: impl Into<String>, source: E) -> Self
	where
		E: std::error::Error + Send + Sync + 'static,
	{
		Error::Transport {
			message: message.into(),
			source: Some(Box::new(source)),
		}
	}

	/// Returns `true` when the failure happened before the remote answered.
	pub fn is_transport(&self) -> bool {
		matches!(self, Error::Transport { .. } | Error::InvalidHost { .. })
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Error::transport_with(err.to_string(), err)
	}
}

impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		Error::transport_with(err.to_string(), err)
	}
}

pub type Result<T> = std::result::Result<T, Error>;
