//! Interactive remote exec sessions.
//!
//! `pi` turns the local terminal, or piped stdin/stdout, into a live channel
//! to a command running inside a remote container. One session is:
//!
//! 1. [`session::Negotiator`] creates the exec instance and hijacks its start
//!    call into a raw connection.
//! 2. [`terminal::TerminalController`] checks the local terminal and switches
//!    it to raw mode for TTY sessions.
//! 3. [`relay::Relay`] copies stdin to the connection and the connection to
//!    stdout/stderr, while [`resize::ResizeMonitor`] forwards window changes.
//! 4. [`exit::resolve_exit`] reads the remote exit code once the relay ends.
//!
//! [`exec::run_exec`] wires these together.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pi::{ExecOptions, LocalStreams, RemoteClient, TerminalController, run_exec};
//!
//! let api = Arc::new(RemoteClient::new(connection));
//! let terminal = Arc::new(TerminalController::stdio());
//! run_exec(api, terminal, options, LocalStreams::stdio(true), CancellationToken::new()).await?;
//! ```

pub mod api;
pub mod error;
pub mod exec;
pub mod exit;
pub mod input;
pub mod relay;
pub mod resize;
pub mod session;
pub mod terminal;
pub mod testing;

pub use api::{ExecApi, RemoteClient};
pub use error::{Error, Result};
pub use exec::{ExecOptions, LocalStreams, run_exec, run_exec_with};
pub use exit::{ExitPolicy, resolve_exit};
pub use input::{InputCloser, LocalInput};
pub use relay::Relay;
pub use resize::{ResizeMonitor, SizeQueue, SizeTracker};
pub use session::{ContainerRef, Negotiator, Session, SessionSpec, SessionState};
pub use terminal::{CrosstermBackend, EffectiveMode, TerminalBackend, TerminalCapabilities, TerminalController};

pub use pi_protocol as protocol;
pub use pi_runtime as runtime;
