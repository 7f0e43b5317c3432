//! Local input for the stdin direction of a session.
//!
//! Reading the process's stdin blocks an OS thread, and a blocked read cannot
//! be interrupted portably. [`LocalInput::stdin`] therefore reads on a
//! dedicated thread and hands chunks over a channel; closing the input
//! through an [`InputCloser`] ends the async side immediately, leaving the
//! thread parked in `read` until the next byte or EOF.

use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const STDIN_CHUNK: usize = 4096;
const STDIN_QUEUE: usize = 16;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Source of bytes for the remote command's stdin.
pub struct LocalInput {
	reader: BoxedReader,
	closed: CancellationToken,
}

impl LocalInput {
	pub fn new(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
		Self {
			reader: Box::new(reader),
			closed: CancellationToken::new(),
		}
	}

	/// The process's stdin, read on a background thread.
	pub fn stdin() -> Self {
		let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(STDIN_QUEUE);

		let spawned = std::thread::Builder::new()
			.name("pi-stdin".into())
			.spawn(move || {
				let stdin = io::stdin();
				let mut lock = stdin.lock();
				let mut buf = [0u8; STDIN_CHUNK];
				loop {
					match lock.read(&mut buf) {
						Ok(0) => {
							trace!(target = "pi.relay", "stdin EOF");
							break;
						}
						Ok(n) => {
							if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
								debug!(target = "pi.relay", "stdin receiver dropped");
								break;
							}
						}
						Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
						Err(err) => {
							let _ = tx.blocking_send(Err(err));
							break;
						}
					}
				}
			});
		if let Err(err) = spawned {
			debug!(target = "pi.relay", error = %err, "failed to spawn stdin reader");
		}

		Self::new(StreamReader::new(ReceiverStream::new(rx)))
	}

	/// Handle that closes this input from elsewhere.
	pub fn closer(&self) -> InputCloser {
		InputCloser(self.closed.clone())
	}

	pub(crate) fn into_parts(self) -> (ClosableReader, CancellationToken) {
		let closed = self.closed.clone();
		(
			ClosableReader {
				inner: self.reader,
				closed: self.closed,
			},
			closed,
		)
	}
}

impl std::fmt::Debug for LocalInput {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LocalInput")
			.field("closed", &self.closed.is_cancelled())
			.finish_non_exhaustive()
	}
}

/// Closes a [`LocalInput`]; later reads report EOF.
#[derive(Debug, Clone)]
pub struct InputCloser(CancellationToken);

impl InputCloser {
	pub fn close(&self) {
		self.0.cancel();
	}

	pub fn is_closed(&self) -> bool {
		self.0.is_cancelled()
	}
}

/// Reader that reports EOF once its input has been closed.
pub(crate) struct ClosableReader {
	inner: BoxedReader,
	closed: CancellationToken,
}

impl AsyncRead for ClosableReader {
	fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
		if self.closed.is_cancelled() {
			return Poll::Ready(Ok(()));
		}
		Pin::new(&mut self.inner).poll_read(cx, buf)
	}
}
