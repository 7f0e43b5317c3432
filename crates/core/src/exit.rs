//! Exit status of a finished exec session.

use std::time::Duration;

use pi_protocol::ExecInspect;
use tracing::{debug, warn};

use crate::api::ExecApi;
use crate::error::{Error, Result};

/// How long to keep asking while the remote still reports `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitPolicy {
	pub attempts: u32,
	pub interval: Duration,
}

impl Default for ExitPolicy {
	fn default() -> Self {
		Self {
			attempts: 10,
			interval: Duration::from_millis(100),
		}
	}
}

/// Inspects session `id` until it stops running.
///
/// Fails with [`Error::Protocol`] once the attempts run out while the remote
/// still reports `running`; its exit code is meaningless at that point.
pub async fn inspect_until_exited(api: &dyn ExecApi, id: &str, policy: ExitPolicy) -> Result<ExecInspect> {
	let attempts = policy.attempts.max(1);
	let mut attempt = 1;
	loop {
		let inspect = api.inspect_exec(id).await?;
		debug!(target = "pi.exec", %id, attempt, running = inspect.running, exit_code = inspect.exit_code, "exec inspected");
		if !inspect.running {
			return Ok(inspect);
		}
		if attempt >= attempts {
			warn!(target = "pi.exec", %id, attempts, "exec still running; giving up");
			return Err(Error::Protocol(format!("exec still running after {attempts} inspections")));
		}
		attempt += 1;
		tokio::time::sleep(policy.interval).await;
	}
}

/// Resolves the session's exit status: `Ok` for zero,
/// [`Error::RemoteExitNonZero`] otherwise.
pub async fn resolve_exit(api: &dyn ExecApi, id: &str, policy: ExitPolicy) -> Result<()> {
	let inspect = inspect_until_exited(api, id, policy).await?;
	match inspect.exit_code {
		0 => Ok(()),
		code => Err(Error::RemoteExitNonZero { code }),
	}
}
