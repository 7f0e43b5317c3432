//! Raw byte streams taken over from an HTTP connection.
//!
//! After [`Connection::hijack`](crate::Connection::hijack) consumes the
//! response head, the socket stops speaking HTTP. Whatever the HTTP reader had
//! already buffered past the head belongs to the stream and is replayed first.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf};

/// Bidirectional byte stream a hijacked session runs over.
pub trait RawStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> RawStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// A socket whose HTTP exchange is finished; bytes flow both ways unframed.
pub struct HijackedConnection {
	stream: Box<dyn RawStream>,
	leftover: Bytes,
}

impl HijackedConnection {
	/// Wraps `stream`; `leftover` is read before anything from the socket.
	pub fn new(stream: impl RawStream, leftover: impl Into<Bytes>) -> Self {
		Self {
			stream: Box::new(stream),
			leftover: leftover.into(),
		}
	}

	/// Splits into independently owned halves.
	pub fn into_split(self) -> (HijackReader, HijackWriter) {
		let (read, write) = tokio::io::split(self.stream);
		(
			HijackReader {
				leftover: self.leftover,
				inner: read,
			},
			HijackWriter { inner: write },
		)
	}

	/// Rejoins halves produced by [`into_split`](Self::into_split).
	///
	/// # Panics
	///
	/// Panics if the halves come from different connections.
	pub fn reunite(reader: HijackReader, writer: HijackWriter) -> Self {
		Self {
			stream: reader.inner.unsplit(writer.inner),
			leftover: reader.leftover,
		}
	}

	/// Closes the socket. Shutdown errors are ignored; the peer may already be gone.
	pub async fn close(mut self) {
		let _ = self.stream.shutdown().await;
	}
}

impl std::fmt::Debug for HijackedConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HijackedConnection")
			.field("buffered", &self.leftover.len())
			.finish_non_exhaustive()
	}
}

/// Read side of a hijacked connection.
pub struct HijackReader {
	leftover: Bytes,
	inner: ReadHalf<Box<dyn RawStream>>,
}

impl AsyncRead for HijackReader {
	fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
		if !self.leftover.is_empty() {
			let n = self.leftover.len().min(buf.remaining());
			buf.put_slice(&self.leftover[..n]);
			self.leftover.advance(n);
			return Poll::Ready(Ok(()));
		}
		Pin::new(&mut self.inner).poll_read(cx, buf)
	}
}

/// Write side of a hijacked connection.
pub struct HijackWriter {
	inner: WriteHalf<Box<dyn RawStream>>,
}

impl HijackWriter {
	/// Half-closes the connection: the peer sees end of input while the read
	/// side stays open.
	pub async fn close_write(&mut self) -> io::Result<()> {
		self.inner.shutdown().await
	}
}

impl AsyncWrite for HijackWriter {
	fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
		Pin::new(&mut self.inner).poll_write(cx, buf)
	}

	fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_flush(cx)
	}

	fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_shutdown(cx)
	}
}
