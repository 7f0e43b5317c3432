//! In-memory fakes for exercising exec sessions without a terminal or a
//! network.
//!
//! # Example
//!
//! ```ignore
//! let (api, mut remote) = FakeExecApiBuilder::new().exec_id("abc123").build();
//! let api = Arc::new(api);
//!
//! tokio::spawn(async move {
//!     let mut conn = remote.accept_attach().await.unwrap();
//!     conn.write_all(b"...").await.unwrap();
//! });
//!
//! run_exec(api.clone(), terminal, options, streams, CancellationToken::new()).await?;
//! assert_eq!(remote.attach_calls(), 1);
//! ```

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pi_protocol::{AttachOptions, ExecConfig, ExecCreateResponse, ExecInspect, ExecStartCheck, ResizeOptions};
use pi_runtime::HijackedConnection;
use tokio::io::{AsyncWrite, DuplexStream};
use tokio::sync::mpsc;

use crate::api::ExecApi;
use crate::error::{Error, Result};
use crate::terminal::TerminalBackend;

const DUPLEX_CAPACITY: usize = 64 * 1024;

/// A call received by [`FakeExecApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
	Create {
		pod: String,
		container: String,
		config: ExecConfig,
	},
	Start {
		id: String,
		check: ExecStartCheck,
	},
	Attach {
		id: String,
		options: AttachOptions,
	},
	Inspect {
		id: String,
	},
	Resize {
		id: String,
		size: ResizeOptions,
	},
}

/// Builder for [`FakeExecApi`].
pub struct FakeExecApiBuilder {
	exec_id: String,
	create_failure: Option<(u16, String)>,
	inspections: VecDeque<ExecInspect>,
	fail_resize: bool,
}

impl FakeExecApiBuilder {
	pub fn new() -> Self {
		Self {
			exec_id: "abc123".into(),
			create_failure: None,
			inspections: VecDeque::new(),
			fail_resize: false,
		}
	}

	/// Id returned by exec-create; an empty string simulates a missing id.
	pub fn exec_id(mut self, id: impl Into<String>) -> Self {
		self.exec_id = id.into();
		self
	}

	/// Makes exec-create answer `status` instead of "created".
	pub fn create_fails(mut self, status: u16, body: impl Into<String>) -> Self {
		self.create_failure = Some((status, body.into()));
		self
	}

	/// Queues an inspect result; the last one repeats.
	pub fn inspect(mut self, running: bool, exit_code: i32) -> Self {
		self.inspections.push_back(ExecInspect { running, exit_code });
		self
	}

	pub fn fail_resize(mut self) -> Self {
		self.fail_resize = true;
		self
	}

	pub fn build(self) -> (FakeExecApi, FakeRemote) {
		let calls = Arc::new(Mutex::new(Vec::new()));
		let (attach_tx, attach_rx) = mpsc::unbounded_channel();
		let api = FakeExecApi {
			exec_id: self.exec_id,
			create_failure: self.create_failure,
			inspections: Mutex::new(self.inspections),
			fail_resize: self.fail_resize,
			calls: Arc::clone(&calls),
			attach_tx,
		};
		let remote = FakeRemote { calls, attach_rx };
		(api, remote)
	}
}

impl Default for FakeExecApiBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// [`ExecApi`] that records calls and hands attached sessions to a [`FakeRemote`].
pub struct FakeExecApi {
	exec_id: String,
	create_failure: Option<(u16, String)>,
	inspections: Mutex<VecDeque<ExecInspect>>,
	fail_resize: bool,
	calls: Arc<Mutex<Vec<ApiCall>>>,
	attach_tx: mpsc::UnboundedSender<DuplexStream>,
}

#[async_trait]
impl ExecApi for FakeExecApi {
	async fn create_exec(&self, pod: &str, container: &str, config: &ExecConfig) -> Result<ExecCreateResponse> {
		self.calls.lock().push(ApiCall::Create {
			pod: pod.into(),
			container: container.into(),
			config: config.clone(),
		});
		if let Some((status, body)) = &self.create_failure {
			return Err(Error::SessionCreate {
				status: *status,
				body: body.clone(),
			});
		}
		Ok(ExecCreateResponse {
			id: self.exec_id.clone(),
			warnings: Vec::new(),
		})
	}

	async fn start_exec(&self, id: &str, check: &ExecStartCheck) -> Result<()> {
		self.calls.lock().push(ApiCall::Start {
			id: id.into(),
			check: *check,
		});
		Ok(())
	}

	async fn attach_exec(&self, id: &str, options: &AttachOptions) -> Result<HijackedConnection> {
		self.calls.lock().push(ApiCall::Attach {
			id: id.into(),
			options: *options,
		});
		let (client, server) = tokio::io::duplex(DUPLEX_CAPACITY);
		self.attach_tx
			.send(server)
			.map_err(|_| Error::Protocol("fake remote is gone".into()))?;
		Ok(HijackedConnection::new(client, Bytes::new()))
	}

	async fn inspect_exec(&self, id: &str) -> Result<ExecInspect> {
		self.calls.lock().push(ApiCall::Inspect { id: id.into() });
		let mut inspections = self.inspections.lock();
		let next = if inspections.len() > 1 {
			inspections.pop_front()
		} else {
			inspections.front().copied()
		};
		Ok(next.unwrap_or_default())
	}

	async fn resize_exec(&self, id: &str, size: ResizeOptions) -> Result<()> {
		self.calls.lock().push(ApiCall::Resize { id: id.into(), size });
		if self.fail_resize {
			return Err(Error::Protocol("resize rejected".into()));
		}
		Ok(())
	}
}

/// Test-side view of a [`FakeExecApi`]: recorded calls and attached sockets.
pub struct FakeRemote {
	calls: Arc<Mutex<Vec<ApiCall>>>,
	attach_rx: mpsc::UnboundedReceiver<DuplexStream>,
}

impl FakeRemote {
	/// Waits for the next attach and returns the remote end of its socket.
	pub async fn accept_attach(&mut self) -> Option<DuplexStream> {
		self.attach_rx.recv().await
	}

	pub fn calls(&self) -> Vec<ApiCall> {
		self.calls.lock().clone()
	}

	pub fn attach_calls(&self) -> usize {
		self.calls.lock().iter().filter(|c| matches!(c, ApiCall::Attach { .. })).count()
	}

	pub fn resizes(&self) -> Vec<ResizeOptions> {
		self.calls
			.lock()
			.iter()
			.filter_map(|c| match c {
				ApiCall::Resize { size, .. } => Some(*size),
				_ => None,
			})
			.collect()
	}
}

/// [`TerminalBackend`] with switchable answers and call counters.
#[derive(Debug)]
pub struct FakeTerminal {
	stdin_tty: bool,
	stdout_tty: bool,
	raw: AtomicBool,
	fail_raw: AtomicBool,
	size: Mutex<(u16, u16)>,
	enables: AtomicUsize,
	disables: AtomicUsize,
}

impl FakeTerminal {
	pub fn new(stdin_tty: bool, stdout_tty: bool) -> Self {
		Self {
			stdin_tty,
			stdout_tty,
			raw: AtomicBool::new(false),
			fail_raw: AtomicBool::new(false),
			size: Mutex::new((0, 0)),
			enables: AtomicUsize::new(0),
			disables: AtomicUsize::new(0),
		}
	}

	pub fn set_size(&self, rows: u16, cols: u16) {
		*self.size.lock() = (rows, cols);
	}

	/// Makes the next raw-mode switch fail.
	pub fn fail_raw_mode(&self) {
		self.fail_raw.store(true, Ordering::SeqCst);
	}

	pub fn enable_calls(&self) -> usize {
		self.enables.load(Ordering::SeqCst)
	}

	pub fn disable_calls(&self) -> usize {
		self.disables.load(Ordering::SeqCst)
	}
}

impl TerminalBackend for FakeTerminal {
	fn stdin_is_terminal(&self) -> bool {
		self.stdin_tty
	}

	fn stdout_is_terminal(&self) -> bool {
		self.stdout_tty
	}

	fn is_raw_mode_enabled(&self) -> io::Result<bool> {
		Ok(self.raw.load(Ordering::SeqCst))
	}

	fn enable_raw_mode(&self) -> io::Result<()> {
		if self.fail_raw.swap(false, Ordering::SeqCst) {
			return Err(io::Error::other("not a terminal"));
		}
		self.enables.fetch_add(1, Ordering::SeqCst);
		self.raw.store(true, Ordering::SeqCst);
		Ok(())
	}

	fn disable_raw_mode(&self) -> io::Result<()> {
		self.disables.fetch_add(1, Ordering::SeqCst);
		self.raw.store(false, Ordering::SeqCst);
		Ok(())
	}

	fn size(&self) -> io::Result<(u16, u16)> {
		Ok(*self.size.lock())
	}
}

/// Cloneable in-memory writer for capturing session output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn contents(&self) -> Vec<u8> {
		self.0.lock().clone()
	}

	pub fn to_string_lossy(&self) -> String {
		String::from_utf8_lossy(&self.0.lock()).into_owned()
	}
}

impl AsyncWrite for SharedBuffer {
	fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
		self.0.lock().extend_from_slice(buf);
		Poll::Ready(Ok(buf.len()))
	}

	fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Ok(()))
	}

	fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Ok(()))
	}
}
