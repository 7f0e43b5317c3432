//! Bidirectional relay over a hijacked exec connection.
//!
//! Two tasks move bytes concurrently:
//!
//! * output: connection → local stdout/stderr, a plain copy for TTY sessions
//!   and a [`StdStreamCodec`] demultiplex otherwise;
//! * input: local stdin → connection, followed by a half-close so the remote
//!   sees EOF.
//!
//! Each task reports on its own oneshot. Whichever reports first decides:
//! output finishing ends the relay with its result; input finishing first
//! still waits for output when there is any. The connection is closed by
//! [`Relay::run`] once both tasks have stopped, exactly once on every path.

use std::io;

use futures_util::StreamExt;
use pi_protocol::{StdStreamCodec, StreamKind};
use pi_runtime::{HijackReader, HijackWriter, HijackedConnection};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::input::LocalInput;

/// Local destination for remote output.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Local end of an attached session.
pub struct Relay {
	tty: bool,
	input: Option<LocalInput>,
	stdout: Option<BoxedWriter>,
	stderr: Option<BoxedWriter>,
	interrupt: CancellationToken,
}

enum Decision {
	Output(io::Result<()>),
	InputDone,
	Interrupted,
}

impl Relay {
	pub fn new(tty: bool) -> Self {
		Self {
			tty,
			input: None,
			stdout: None,
			stderr: None,
			interrupt: CancellationToken::new(),
		}
	}

	pub fn input(mut self, input: LocalInput) -> Self {
		self.input = Some(input);
		self
	}

	pub fn stdout(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
		self.stdout = Some(Box::new(writer));
		self
	}

	pub fn stderr(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
		self.stderr = Some(Box::new(writer));
		self
	}

	/// Cancelling `token` aborts both directions with [`Error::Interrupted`].
	pub fn interrupt_on(mut self, token: CancellationToken) -> Self {
		self.interrupt = token;
		self
	}

	/// Relays until the session is over, then closes `conn`.
	pub async fn run(self, conn: HijackedConnection) -> Result<()> {
		let Relay {
			tty,
			input,
			stdout,
			stderr,
			interrupt,
		} = self;
		let (reader, writer) = conn.into_split();
		let has_output = stdout.is_some() || stderr.is_some();

		let (output_rx, output_task, idle_reader) = if has_output {
			let (tx, rx) = oneshot::channel();
			let task = tokio::spawn(pump_output(reader, tty, stdout, stderr, tx));
			(Some(rx), Some(task), None)
		} else {
			(None, None, Some(reader))
		};

		let (input_done_tx, mut input_done_rx) = oneshot::channel();
		let input_task = tokio::spawn(pump_input(writer, input, input_done_tx));

		let output_done = async move {
			match output_rx {
				Some(rx) => rx
					.await
					.unwrap_or_else(|_| Err(io::Error::other("output relay stopped without a result"))),
				None => std::future::pending().await,
			}
		};
		tokio::pin!(output_done);

		let decision = tokio::select! {
			biased;
			_ = interrupt.cancelled() => Decision::Interrupted,
			result = &mut output_done => Decision::Output(result),
			_ = &mut input_done_rx => Decision::InputDone,
		};

		let result = match decision {
			Decision::Output(result) => {
				trace!(target = "pi.relay", "output finished first");
				result.map_err(Error::Stream)
			}
			Decision::InputDone if has_output => {
				trace!(target = "pi.relay", "input finished; draining output");
				tokio::select! {
					biased;
					_ = interrupt.cancelled() => Err(Error::Interrupted),
					result = &mut output_done => result.map_err(Error::Stream),
				}
			}
			Decision::InputDone => Ok(()),
			Decision::Interrupted => Err(Error::Interrupted),
		};

		let reader = match output_task {
			Some(task) => join_half(task).await,
			None => idle_reader,
		};
		let writer = join_half(input_task).await;

		match (reader, writer) {
			(Some(reader), Some(writer)) => HijackedConnection::reunite(reader, writer).close().await,
			// A half lost to an aborted task was dropped inside it; dropping the
			// other one releases the socket.
			(reader, writer) => drop((reader, writer)),
		}
		debug!(target = "pi.relay", ok = result.is_ok(), "connection closed");

		result
	}
}

/// Stops `task` if it is still running and recovers the half it owned.
async fn join_half<T>(task: JoinHandle<T>) -> Option<T> {
	task.abort();
	task.await.ok()
}

async fn pump_output(
	mut reader: HijackReader,
	tty: bool,
	mut stdout: Option<BoxedWriter>,
	mut stderr: Option<BoxedWriter>,
	done: oneshot::Sender<io::Result<()>>,
) -> HijackReader {
	let result = match (tty, stdout.as_mut()) {
		(true, Some(out)) => copy_raw(&mut reader, out).await,
		(_, out) => demux(&mut reader, out, stderr.as_mut()).await,
	};
	trace!(target = "pi.relay", ok = result.is_ok(), "end of output");
	let _ = done.send(result);
	reader
}

async fn copy_raw(reader: &mut HijackReader, out: &mut BoxedWriter) -> io::Result<()> {
	tokio::io::copy(reader, out).await?;
	out.flush().await
}

/// Routes each frame's payload to the writer its selector names.
async fn demux(
	reader: &mut HijackReader,
	mut stdout: Option<&mut BoxedWriter>,
	mut stderr: Option<&mut BoxedWriter>,
) -> io::Result<()> {
	let mut frames = FramedRead::new(reader, StdStreamCodec::new());
	while let Some(frame) = frames.next().await {
		let frame = match frame {
			Ok(frame) => frame,
			Err(err) if err.is_end_of_stream() => {
				debug!(target = "pi.relay", error = %err, "treating malformed frame as end of stream");
				break;
			}
			Err(err) => return Err(io::Error::other(err)),
		};
		let dest = match frame.kind {
			StreamKind::Stdout => stdout.as_deref_mut(),
			StreamKind::Stderr => stderr.as_deref_mut(),
		};
		if let Some(dest) = dest {
			dest.write_all(&frame.payload).await?;
			dest.flush().await?;
		}
	}
	Ok(())
}

async fn pump_input(mut writer: HijackWriter, input: Option<LocalInput>, done: oneshot::Sender<()>) -> HijackWriter {
	if let Some(input) = input {
		let (mut reader, closed) = input.into_parts();
		let copied = tokio::select! {
			copied = tokio::io::copy(&mut reader, &mut writer) => copied,
			_ = closed.cancelled() => Ok(0),
		};
		match copied {
			Ok(bytes) => trace!(target = "pi.relay", bytes, "end of input"),
			Err(err) => debug!(target = "pi.relay", error = %err, "input copy failed"),
		}
	}

	if let Err(err) = writer.close_write().await {
		debug!(target = "pi.relay", error = %err, "couldn't send EOF");
	}
	let _ = done.send(());
	writer
}
