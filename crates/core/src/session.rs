//! Exec session negotiation.
//!
//! A session moves `Created → Started | Attached → Closed`. Creation posts
//! the exec config and must yield a non-empty id. Sessions with at least one
//! stream attached are then started through a hijack and become `Attached`;
//! fully detached ones get a plain start call and are done (`Started`).
//! `Closed` is local bookkeeping once the relay has finished.

use pi_protocol::{AttachOptions, ExecConfig, ExecStartCheck};
use pi_runtime::HijackedConnection;
use tracing::debug;

use crate::api::ExecApi;
use crate::error::{Error, Result};

/// Pod and container a session runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
	pub pod: String,
	pub container: String,
}

/// What to run and which streams to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
	pub container: ContainerRef,
	pub command: Vec<String>,
	pub tty: bool,
	pub attach_stdin: bool,
	pub attach_stdout: bool,
	pub attach_stderr: bool,
}

impl SessionSpec {
	pub fn attaches_any_stream(&self) -> bool {
		self.attach_stdin || self.attach_stdout || self.attach_stderr
	}

	fn exec_config(&self) -> ExecConfig {
		ExecConfig {
			tty: self.tty,
			attach_stdin: self.attach_stdin,
			attach_stdout: self.attach_stdout,
			attach_stderr: self.attach_stderr,
			detach: !self.attaches_any_stream(),
			cmd: self.command.clone(),
			..ExecConfig::default()
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Created,
	Started,
	Attached,
	Closed,
}

/// One remote command execution.
#[derive(Debug, Clone)]
pub struct Session {
	id: String,
	spec: SessionSpec,
	state: SessionState,
}

impl Session {
	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	/// Marks the relay as finished.
	pub fn close(&mut self) {
		self.state = SessionState::Closed;
	}
}

/// Drives the create/start/attach calls for a session.
pub struct Negotiator<'a> {
	api: &'a dyn ExecApi,
}

impl<'a> Negotiator<'a> {
	pub fn new(api: &'a dyn ExecApi) -> Self {
		Self { api }
	}

	/// Creates the exec instance. An empty id is a protocol error.
	pub async fn create(&self, spec: SessionSpec) -> Result<Session> {
		let config = spec.exec_config();
		let created = self
			.api
			.create_exec(&spec.container.pod, &spec.container.container, &config)
			.await?;
		for warning in &created.warnings {
			debug!(target = "pi.exec", %warning, "exec create warning");
		}
		if created.id.is_empty() {
			return Err(Error::Protocol("exec create returned an empty session id".into()));
		}
		debug!(target = "pi.exec", id = %created.id, tty = spec.tty, "session created");
		Ok(Session {
			id: created.id,
			spec,
			state: SessionState::Created,
		})
	}

	/// Starts a created session: attached sessions come back with their
	/// hijacked connection, detached ones with `None`.
	pub async fn open(&self, session: &mut Session) -> Result<Option<HijackedConnection>> {
		if session.state != SessionState::Created {
			return Err(Error::Protocol(format!("cannot start session in state {:?}", session.state)));
		}

		if !session.spec.attaches_any_stream() {
			let check = ExecStartCheck {
				detach: true,
				tty: session.spec.tty,
			};
			self.api.start_exec(&session.id, &check).await?;
			session.state = SessionState::Started;
			debug!(target = "pi.exec", id = %session.id, "detached session started");
			return Ok(None);
		}

		let conn = self
			.api
			.attach_exec(&session.id, &AttachOptions { tty: session.spec.tty })
			.await?;
		session.state = SessionState::Attached;
		debug!(target = "pi.exec", id = %session.id, "session attached");
		Ok(Some(conn))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{ApiCall, FakeExecApiBuilder};

	fn spec(stdin: bool, streams: bool) -> SessionSpec {
		SessionSpec {
			container: ContainerRef {
				pod: "web".into(),
				container: "app".into(),
			},
			command: vec!["sh".into()],
			tty: false,
			attach_stdin: stdin,
			attach_stdout: streams,
			attach_stderr: streams,
		}
	}

	#[tokio::test]
	async fn attached_session_hijacks_start() {
		let (api, mut remote) = FakeExecApiBuilder::new().build();
		let negotiator = Negotiator::new(&api);

		let mut session = negotiator.create(spec(true, true)).await.unwrap();
		assert_eq!(session.state(), SessionState::Created);
		assert_eq!(session.id(), "abc123");

		let conn = negotiator.open(&mut session).await.unwrap();
		assert!(conn.is_some());
		assert!(remote.accept_attach().await.is_some());
		assert_eq!(session.state(), SessionState::Attached);

		session.close();
		assert_eq!(session.state(), SessionState::Closed);

		match &remote.calls()[0] {
			ApiCall::Create { pod, container, config } => {
				assert_eq!((pod.as_str(), container.as_str()), ("web", "app"));
				assert!(config.attach_stdin && config.attach_stdout && config.attach_stderr);
				assert!(!config.detach);
				assert_eq!(config.cmd, vec!["sh".to_string()]);
			}
			other => panic!("unexpected first call: {other:?}"),
		}
	}

	#[tokio::test]
	async fn detached_session_uses_plain_start() {
		let (api, remote) = FakeExecApiBuilder::new().build();
		let negotiator = Negotiator::new(&api);

		let mut session = negotiator.create(spec(false, false)).await.unwrap();
		assert!(negotiator.open(&mut session).await.unwrap().is_none());
		assert_eq!(session.state(), SessionState::Started);
		assert_eq!(remote.attach_calls(), 0);
		assert!(remote.calls().contains(&ApiCall::Start {
			id: "abc123".into(),
			check: ExecStartCheck { detach: true, tty: false },
		}));
	}

	#[tokio::test]
	async fn empty_id_is_a_protocol_error() {
		let (api, remote) = FakeExecApiBuilder::new().exec_id("").build();
		let err = Negotiator::new(&api).create(spec(true, true)).await.unwrap_err();
		assert!(matches!(err, Error::Protocol(_)));
		assert_eq!(remote.attach_calls(), 0);
	}

	#[tokio::test]
	async fn create_failure_is_fatal() {
		let (api, remote) = FakeExecApiBuilder::new().create_fails(404, "pod not found").build();
		let err = Negotiator::new(&api).create(spec(true, true)).await.unwrap_err();
		assert!(matches!(err, Error::SessionCreate { status: 404, .. }));
		assert_eq!(remote.calls().len(), 1);
	}

	#[tokio::test]
	async fn a_session_is_opened_once() {
		let (api, _remote) = FakeExecApiBuilder::new().build();
		let negotiator = Negotiator::new(&api);
		let mut session = negotiator.create(spec(false, false)).await.unwrap();
		negotiator.open(&mut session).await.unwrap();
		assert!(negotiator.open(&mut session).await.is_err());
	}
}
