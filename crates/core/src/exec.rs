//! End-to-end run of one `exec` invocation.

use std::future::Future;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::ExecApi;
use crate::error::{Error, Result};
use crate::exit::{ExitPolicy, resolve_exit};
use crate::input::LocalInput;
use crate::relay::{BoxedWriter, Relay};
use crate::resize::{ResizeMonitor, ResizeTriggers, platform_triggers};
use crate::session::{ContainerRef, Negotiator, SessionSpec};
use crate::terminal::{TTY_UNAVAILABLE, TerminalController};

/// What the user asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
	pub container: ContainerRef,
	pub command: Vec<String>,
	/// Pass local stdin to the command.
	pub stdin: bool,
	pub tty: bool,
	/// Start without attaching any stream.
	pub detach: bool,
	pub exit_policy: ExitPolicy,
}

/// Local ends of the session streams.
pub struct LocalStreams {
	pub input: Option<LocalInput>,
	pub stdout: BoxedWriter,
	pub stderr: BoxedWriter,
}

impl LocalStreams {
	/// Process stdio; stdin is only read when `with_input` is set.
	pub fn stdio(with_input: bool) -> Self {
		Self {
			input: with_input.then(LocalInput::stdin),
			stdout: Box::new(tokio::io::stdout()),
			stderr: Box::new(tokio::io::stderr()),
		}
	}
}

/// Runs one exec invocation.
///
/// Returns `Ok` when the remote command exited zero (or was started
/// detached), [`Error::RemoteExitNonZero`] when it exited non-zero and
/// [`Error::Interrupted`] when `interrupt` fired first. The terminal is
/// restored before returning on every path past [`TerminalController::prepare`].
pub async fn run_exec(
	api: Arc<dyn ExecApi>,
	terminal: Arc<TerminalController>,
	options: ExecOptions,
	streams: LocalStreams,
	interrupt: CancellationToken,
) -> Result<()> {
	run_exec_with(api, terminal, options, streams, interrupt, platform_triggers).await
}

/// [`run_exec`] with a custom source of resize triggers.
pub async fn run_exec_with(
	api: Arc<dyn ExecApi>,
	terminal: Arc<TerminalController>,
	options: ExecOptions,
	mut streams: LocalStreams,
	interrupt: CancellationToken,
	triggers: impl FnOnce() -> ResizeTriggers,
) -> Result<()> {
	let mode = terminal.prepare(options.stdin && !options.detach, options.tty);
	if mode.tty_downgraded {
		let notice = format!("{TTY_UNAVAILABLE}\n");
		let _ = streams.stderr.write_all(notice.as_bytes()).await;
		let _ = streams.stderr.flush().await;
	}

	let spec = SessionSpec {
		container: options.container.clone(),
		command: options.command.clone(),
		tty: mode.tty,
		attach_stdin: mode.stdin,
		attach_stdout: !options.detach,
		attach_stderr: !options.detach,
	};
	info!(
		target = "pi.exec",
		pod = %spec.container.pod,
		container = %spec.container.container,
		tty = spec.tty,
		stdin = spec.attach_stdin,
		"starting exec"
	);

	let negotiator = Negotiator::new(api.as_ref());
	let mut session = interruptible(&interrupt, negotiator.create(spec)).await?;
	if !options.detach {
		terminal.check_tty_input(&mode)?;
	}
	let conn = match interruptible(&interrupt, negotiator.open(&mut session)).await? {
		Some(conn) => conn,
		None => return Ok(()),
	};

	let input = if mode.stdin { streams.input.take() } else { None };
	if let Some(input) = &input {
		terminal.track_input(input.closer());
	}

	let outcome = async {
		if mode.tty && input.is_some() {
			terminal.enter_raw()?;
		}

		let _monitor = (mode.tty && terminal.stdin_is_terminal())
			.then(|| ResizeMonitor::spawn_with(api.clone(), session.id(), terminal.clone(), triggers()));

		let mut relay = Relay::new(mode.tty).stdout(streams.stdout).interrupt_on(interrupt.clone());
		if !mode.tty {
			relay = relay.stderr(streams.stderr);
		}
		if let Some(input) = input {
			relay = relay.input(input);
		}
		relay.run(conn).await
	}
	.await;

	terminal.restore();
	outcome?;
	session.close();
	debug!(target = "pi.exec", id = %session.id(), "relay finished");

	interruptible(&interrupt, resolve_exit(api.as_ref(), session.id(), options.exit_policy)).await
}

async fn interruptible<T>(interrupt: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
	tokio::select! {
		biased;
		_ = interrupt.cancelled() => Err(Error::Interrupted),
		result = fut => result,
	}
}
