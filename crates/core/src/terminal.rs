//! Local terminal detection, raw mode and restoration.
//!
//! [`TerminalController`] owns the local terminal for the length of one
//! session. It decides whether a TTY session is possible at all
//! ([`prepare`](TerminalController::prepare)), switches the terminal into raw
//! mode ([`enter_raw`](TerminalController::enter_raw)) and puts it back
//! ([`restore`](TerminalController::restore)). Restoring takes the captured
//! state, so only the first call has any effect.
//!
//! The terminal itself sits behind [`TerminalBackend`]; [`CrosstermBackend`]
//! drives the process's real stdin/stdout.

use std::io::{self, IsTerminal};
use std::sync::Arc;

use parking_lot::Mutex;
use pi_protocol::ResizeOptions;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::input::InputCloser;

/// Printed when a TTY was requested but stdin cannot provide one.
pub const TTY_UNAVAILABLE: &str = "Unable to use a TTY - input is not a terminal or the right kind of file";

/// Environment variable that, when non-empty, keeps the terminal out of raw mode.
pub const NORAW_ENV: &str = "NORAW";

/// Access to the local terminal.
pub trait TerminalBackend: Send + Sync {
	fn stdin_is_terminal(&self) -> bool;

	fn stdout_is_terminal(&self) -> bool;

	fn is_raw_mode_enabled(&self) -> io::Result<bool>;

	fn enable_raw_mode(&self) -> io::Result<()>;

	fn disable_raw_mode(&self) -> io::Result<()>;

	/// Current size as `(rows, cols)`.
	fn size(&self) -> io::Result<(u16, u16)>;
}

/// The process's stdin/stdout, driven through crossterm.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrosstermBackend;

impl TerminalBackend for CrosstermBackend {
	fn stdin_is_terminal(&self) -> bool {
		io::stdin().is_terminal()
	}

	fn stdout_is_terminal(&self) -> bool {
		io::stdout().is_terminal()
	}

	fn is_raw_mode_enabled(&self) -> io::Result<bool> {
		crossterm::terminal::is_raw_mode_enabled()
	}

	fn enable_raw_mode(&self) -> io::Result<()> {
		crossterm::terminal::enable_raw_mode()
	}

	fn disable_raw_mode(&self) -> io::Result<()> {
		crossterm::terminal::disable_raw_mode()
	}

	fn size(&self) -> io::Result<(u16, u16)> {
		let (cols, rows) = crossterm::terminal::size()?;
		Ok((rows, cols))
	}
}

/// Platform and environment facts resolved once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminalCapabilities {
	/// Closing stdin after a restore can block forever on this platform.
	pub defer_input_close: bool,
	/// `NORAW` is set: raw mode is never entered.
	pub raw_mode_disabled: bool,
}

impl TerminalCapabilities {
	pub fn detect() -> Self {
		Self::from_env(|key| std::env::var(key).ok())
	}

	pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
		Self {
			defer_input_close: cfg!(target_os = "macos"),
			raw_mode_disabled: lookup(NORAW_ENV).is_some_and(|value| !value.is_empty()),
		}
	}
}

/// What a session may actually do after checking the local terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveMode {
	/// Local stdin is wired to the session.
	pub stdin: bool,
	pub tty: bool,
	/// A TTY was requested but refused; [`TTY_UNAVAILABLE`] should be shown.
	pub tty_downgraded: bool,
}

/// Terminal mode captured before entering raw mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalState {
	was_raw: bool,
}

/// Owner of the local terminal for one session.
pub struct TerminalController {
	backend: Arc<dyn TerminalBackend>,
	capabilities: TerminalCapabilities,
	captured: Mutex<Option<TerminalState>>,
	input: Mutex<Option<InputCloser>>,
}

impl TerminalController {
	pub fn new(backend: Arc<dyn TerminalBackend>, capabilities: TerminalCapabilities) -> Self {
		Self {
			backend,
			capabilities,
			captured: Mutex::new(None),
			input: Mutex::new(None),
		}
	}

	/// Controller for the process's own terminal.
	pub fn stdio() -> Self {
		Self::new(Arc::new(CrosstermBackend), TerminalCapabilities::detect())
	}

	pub fn stdin_is_terminal(&self) -> bool {
		self.backend.stdin_is_terminal()
	}

	/// Validates the requested mode against the local terminal.
	///
	/// Without stdin there is no TTY. A TTY over non-terminal stdin is
	/// downgraded rather than refused.
	pub fn prepare(&self, want_stdin: bool, want_tty: bool) -> EffectiveMode {
		if !want_stdin {
			return EffectiveMode {
				stdin: false,
				tty: false,
				tty_downgraded: false,
			};
		}
		if want_tty && !self.backend.stdin_is_terminal() {
			debug!(target = "pi.terminal", "stdin is not a terminal; disabling tty");
			return EffectiveMode {
				stdin: true,
				tty: false,
				tty_downgraded: true,
			};
		}
		EffectiveMode {
			stdin: true,
			tty: want_tty,
			tty_downgraded: false,
		}
	}

	/// Refuses a TTY session whose input is not a terminal.
	pub fn check_tty_input(&self, mode: &EffectiveMode) -> Result<()> {
		if mode.tty && mode.stdin && !self.backend.stdin_is_terminal() {
			return Err(Error::InvalidInput("cannot enable tty mode on non tty input".into()));
		}
		Ok(())
	}

	/// Registers the session input so [`restore`](Self::restore) can close it.
	pub fn track_input(&self, closer: InputCloser) {
		*self.input.lock() = Some(closer);
	}

	/// Switches the terminal to raw mode, capturing the previous state.
	///
	/// Succeeds without doing anything when stdin is not a terminal or
	/// `NORAW` is set.
	pub fn enter_raw(&self) -> Result<()> {
		if !self.backend.stdin_is_terminal() || self.capabilities.raw_mode_disabled {
			debug!(
				target = "pi.terminal",
				raw_mode_disabled = self.capabilities.raw_mode_disabled,
				"leaving terminal mode unchanged"
			);
			return Ok(());
		}

		let mut captured = self.captured.lock();
		if captured.is_some() {
			return Ok(());
		}
		let was_raw = self
			.backend
			.is_raw_mode_enabled()
			.map_err(|e| Error::TerminalMode(format!("failed to read terminal mode: {e}")))?;
		self.backend
			.enable_raw_mode()
			.map_err(|e| Error::TerminalMode(format!("failed to enter raw mode: {e}")))?;
		*captured = Some(TerminalState { was_raw });
		debug!(target = "pi.terminal", "entered raw mode");
		Ok(())
	}

	/// Puts back the captured terminal state and closes the tracked input.
	///
	/// Only the first call restores anything; restore failures are logged.
	pub fn restore(&self) {
		if let Some(state) = self.captured.lock().take() {
			if !state.was_raw {
				match self.backend.disable_raw_mode() {
					Ok(()) => debug!(target = "pi.terminal", "restored terminal mode"),
					Err(err) => warn!(target = "pi.terminal", error = %err, "failed to restore terminal mode"),
				}
			}
		}

		let input = self.input.lock().take();
		if let Some(input) = input {
			if self.capabilities.defer_input_close {
				debug!(target = "pi.terminal", "leaving input open on this platform");
			} else {
				input.close();
			}
		}
	}

	/// Current size for a resize call; `0x0` when stdout is not a terminal.
	pub fn size(&self) -> ResizeOptions {
		if !self.backend.stdout_is_terminal() {
			return ResizeOptions::default();
		}
		match self.backend.size() {
			Ok((height, width)) => ResizeOptions { height, width },
			Err(err) => {
				debug!(target = "pi.resize", error = %err, "failed to read terminal size");
				ResizeOptions::default()
			}
		}
	}
}

impl Drop for TerminalController {
	fn drop(&mut self) {
		self.restore();
	}
}

impl std::fmt::Debug for TerminalController {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TerminalController")
			.field("capabilities", &self.capabilities)
			.field("captured", &*self.captured.lock())
			.finish_non_exhaustive()
	}
}
