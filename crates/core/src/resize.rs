//! Terminal size forwarding for TTY sessions.
//!
//! A watcher task reads the local terminal size once up front and again on
//! every trigger (`SIGWINCH` on Unix, a 250 ms tick elsewhere), pushing each
//! new, non-zero size into a [`SizeQueue`]. A forwarder drains the queue into
//! resize calls. Both tasks belong to a [`ResizeMonitor`] and stop when it is
//! dropped; forwarding failures are only logged.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use pi_protocol::ResizeOptions;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::api::ExecApi;
use crate::terminal::TerminalController;

/// Poll interval on platforms without a window-change signal.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

const QUEUE_DEPTH: usize = 8;

/// Wakeups that prompt a fresh size reading.
pub type ResizeTriggers = Pin<Box<dyn Stream<Item = ()> + Send>>;

/// Deduplicates size readings before they are forwarded.
#[derive(Debug, Default, Clone)]
pub struct SizeTracker {
	last: Option<ResizeOptions>,
}

impl SizeTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the size to forward, if any: `0x0` and repeats yield nothing.
	pub fn observe(&mut self, size: ResizeOptions) -> Option<ResizeOptions> {
		if size.is_empty() || self.last == Some(size) {
			return None;
		}
		self.last = Some(size);
		Some(size)
	}
}

/// Sizes waiting to be sent to the remote session.
#[derive(Debug)]
pub struct SizeQueue {
	rx: mpsc::Receiver<ResizeOptions>,
}

impl SizeQueue {
	pub async fn next(&mut self) -> Option<ResizeOptions> {
		self.rx.recv().await
	}
}

/// Platform trigger: `SIGWINCH` where available, polling otherwise.
pub fn platform_triggers() -> ResizeTriggers {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{SignalKind, signal};
		use tokio_stream::wrappers::SignalStream;

		match signal(SignalKind::window_change()) {
			Ok(sigwinch) => return Box::pin(SignalStream::new(sigwinch)),
			Err(err) => {
				debug!(target = "pi.resize", error = %err, "SIGWINCH unavailable; polling terminal size");
			}
		}
	}
	polling_triggers(POLL_INTERVAL)
}

/// Fires every `period`, starting one period from now.
pub fn polling_triggers(period: Duration) -> ResizeTriggers {
	let start = tokio::time::Instant::now() + period;
	let interval = tokio::time::interval_at(start, period);
	Box::pin(tokio_stream::wrappers::IntervalStream::new(interval).map(|_| ()))
}

/// Reads sizes from `terminal` on start and on each trigger.
pub fn watch(terminal: Arc<TerminalController>, mut triggers: ResizeTriggers) -> (SizeQueue, JoinHandle<()>) {
	let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
	let task = tokio::spawn(async move {
		let mut tracker = SizeTracker::new();
		loop {
			let reading = terminal.size();
			if let Some(size) = tracker.observe(reading) {
				trace!(target = "pi.resize", height = size.height, width = size.width, "terminal size changed");
				if tx.send(size).await.is_err() {
					break;
				}
			}
			if triggers.next().await.is_none() {
				break;
			}
		}
	});
	(SizeQueue { rx }, task)
}

/// Sends every queued size to the exec session `id`.
pub async fn forward(api: Arc<dyn ExecApi>, id: String, mut queue: SizeQueue) {
	while let Some(size) = queue.next().await {
		if let Err(err) = api.resize_exec(&id, size).await {
			warn!(target = "pi.resize", error = %err, height = size.height, width = size.width, "resize failed");
		}
	}
}

/// Background size forwarding for one session; stops on drop.
#[derive(Debug)]
pub struct ResizeMonitor {
	watcher: JoinHandle<()>,
	forwarder: JoinHandle<()>,
}

impl ResizeMonitor {
	pub fn spawn_with(
		api: Arc<dyn ExecApi>,
		id: impl Into<String>,
		terminal: Arc<TerminalController>,
		triggers: ResizeTriggers,
	) -> Self {
		let (queue, watcher) = watch(terminal, triggers);
		let forwarder = tokio::spawn(forward(api, id.into(), queue));
		Self { watcher, forwarder }
	}
}

impl Drop for ResizeMonitor {
	fn drop(&mut self) {
		self.watcher.abort();
		self.forwarder.abort();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::terminal::TerminalCapabilities;
	use crate::testing::{FakeExecApiBuilder, FakeTerminal};
	use tokio_stream::wrappers::UnboundedReceiverStream;

	fn size(height: u16, width: u16) -> ResizeOptions {
		ResizeOptions { height, width }
	}

	#[test]
	fn zero_reading_is_never_forwarded() {
		let mut tracker = SizeTracker::new();
		assert_eq!(tracker.observe(size(0, 0)), None);
		assert_eq!(tracker.observe(size(0, 0)), None);
	}

	#[test]
	fn change_is_forwarded_once() {
		let mut tracker = SizeTracker::new();
		assert_eq!(tracker.observe(size(24, 80)), Some(size(24, 80)));
		assert_eq!(tracker.observe(size(30, 80)), Some(size(30, 80)));
		assert_eq!(tracker.observe(size(30, 80)), None);
	}

	#[test]
	fn zero_between_readings_does_not_reset_tracking() {
		let mut tracker = SizeTracker::new();
		tracker.observe(size(24, 80));
		assert_eq!(tracker.observe(size(0, 0)), None);
		assert_eq!(tracker.observe(size(24, 80)), None);
	}

	#[tokio::test(start_paused = true)]
	async fn polling_fires_once_per_period_and_not_at_start() {
		let start = tokio::time::Instant::now();
		let mut triggers = polling_triggers(POLL_INTERVAL);

		assert_eq!(triggers.next().await, Some(()));
		assert_eq!(start.elapsed(), POLL_INTERVAL);
		assert_eq!(triggers.next().await, Some(()));
		assert_eq!(start.elapsed(), POLL_INTERVAL * 2);
		assert_eq!(triggers.next().await, Some(()));
		assert_eq!(start.elapsed(), POLL_INTERVAL * 3);
	}

	async fn settle() {
		for _ in 0..20 {
			tokio::task::yield_now().await;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}

	#[tokio::test]
	async fn monitor_forwards_initial_and_changed_sizes() {
		let fake = Arc::new(FakeTerminal::new(true, true));
		fake.set_size(24, 80);
		let terminal = Arc::new(TerminalController::new(fake.clone(), TerminalCapabilities::default()));
		let (api, remote) = FakeExecApiBuilder::new().build();
		let (tick, ticks) = mpsc::unbounded_channel();

		let monitor = ResizeMonitor::spawn_with(
			Arc::new(api),
			"abc123",
			terminal,
			Box::pin(UnboundedReceiverStream::new(ticks)),
		);
		settle().await;
		assert_eq!(remote.resizes(), vec![size(24, 80)]);

		fake.set_size(30, 80);
		tick.send(()).unwrap();
		settle().await;
		tick.send(()).unwrap();
		settle().await;
		assert_eq!(remote.resizes(), vec![size(24, 80), size(30, 80)]);

		drop(monitor);
	}

	#[tokio::test]
	async fn monitor_without_terminal_output_sends_nothing() {
		let fake = Arc::new(FakeTerminal::new(true, false));
		fake.set_size(24, 80);
		let terminal = Arc::new(TerminalController::new(fake, TerminalCapabilities::default()));
		let (api, remote) = FakeExecApiBuilder::new().build();
		let (tick, ticks) = mpsc::unbounded_channel();

		let _monitor = ResizeMonitor::spawn_with(
			Arc::new(api),
			"abc123",
			terminal,
			Box::pin(UnboundedReceiverStream::new(ticks)),
		);
		tick.send(()).unwrap();
		settle().await;
		assert!(remote.resizes().is_empty());
	}

	#[tokio::test]
	async fn resize_failures_do_not_stop_forwarding() {
		let fake = Arc::new(FakeTerminal::new(true, true));
		fake.set_size(24, 80);
		let terminal = Arc::new(TerminalController::new(fake.clone(), TerminalCapabilities::default()));
		let (api, remote) = FakeExecApiBuilder::new().fail_resize().build();
		let (tick, ticks) = mpsc::unbounded_channel();

		let _monitor = ResizeMonitor::spawn_with(
			Arc::new(api),
			"abc123",
			terminal,
			Box::pin(UnboundedReceiverStream::new(ticks)),
		);
		settle().await;
		fake.set_size(40, 120);
		tick.send(()).unwrap();
		settle().await;
		assert_eq!(remote.resizes(), vec![size(24, 80), size(40, 120)]);
	}
}
