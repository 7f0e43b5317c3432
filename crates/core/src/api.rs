//! Control-plane calls used by an exec session.
//!
//! [`ExecApi`] is the seam between session orchestration and the network:
//! [`RemoteClient`] implements it over a signed [`Connection`], tests swap in
//! an in-memory fake.

use async_trait::async_trait;
use pi_protocol::paths;
use pi_protocol::{AttachOptions, ExecConfig, ExecCreateResponse, ExecInspect, ExecStartCheck, Pod, ResizeOptions};
use pi_runtime::{Connection, HijackedConnection};
use tracing::debug;

use crate::error::{Error, Result};

const CREATED: u16 = 201;
const OK: u16 = 200;

/// Remote operations behind one exec session.
#[async_trait]
pub trait ExecApi: Send + Sync {
	/// Creates the exec instance; any status but "created" is [`Error::SessionCreate`].
	async fn create_exec(&self, pod: &str, container: &str, config: &ExecConfig) -> Result<ExecCreateResponse>;

	/// Starts an exec instance without attaching any stream.
	async fn start_exec(&self, id: &str, check: &ExecStartCheck) -> Result<()>;

	/// Starts an exec instance and takes over its connection.
	async fn attach_exec(&self, id: &str, options: &AttachOptions) -> Result<HijackedConnection>;

	async fn inspect_exec(&self, id: &str) -> Result<ExecInspect>;

	async fn resize_exec(&self, id: &str, size: ResizeOptions) -> Result<()>;
}

/// [`ExecApi`] over a signed connection.
#[derive(Debug, Clone)]
pub struct RemoteClient {
	conn: Connection,
}

impl RemoteClient {
	pub fn new(conn: Connection) -> Self {
		Self { conn }
	}

	/// Fetches a pod in the default namespace.
	pub async fn get_pod(&self, name: &str) -> Result<Pod> {
		let path = paths::pod(name);
		let response = self.conn.request("GET", &path, None).await?.expect("GET", &path, OK)?;
		Ok(response.json()?)
	}
}

#[async_trait]
impl ExecApi for RemoteClient {
	async fn create_exec(&self, pod: &str, container: &str, config: &ExecConfig) -> Result<ExecCreateResponse> {
		let path = paths::exec_create(pod, container);
		let response = self.conn.request_json("POST", &path, config).await?;
		if response.status != CREATED {
			return Err(Error::SessionCreate {
				status: response.status,
				body: response.text(),
			});
		}
		let created: ExecCreateResponse = response.json()?;
		debug!(target = "pi.exec", %pod, %container, id = %created.id, "exec created");
		Ok(created)
	}

	async fn start_exec(&self, id: &str, check: &ExecStartCheck) -> Result<()> {
		let path = paths::exec_start(id);
		self.conn.request_json("POST", &path, check).await?.expect("POST", &path, OK)?;
		Ok(())
	}

	async fn attach_exec(&self, id: &str, options: &AttachOptions) -> Result<HijackedConnection> {
		let path = paths::exec_start(id);
		let body = serde_json::to_vec(options).map_err(pi_runtime::Error::from)?;
		Ok(self.conn.hijack("POST", &path, Some(body)).await?)
	}

	async fn inspect_exec(&self, id: &str) -> Result<ExecInspect> {
		let path = paths::exec_inspect(id);
		let response = self.conn.request("GET", &path, None).await?.expect("GET", &path, OK)?;
		Ok(response.json()?)
	}

	async fn resize_exec(&self, id: &str, size: ResizeOptions) -> Result<()> {
		let path = paths::exec_resize(id);
		self.conn.request_json("POST", &path, &size).await?.expect("POST", &path, OK)?;
		Ok(())
	}
}
