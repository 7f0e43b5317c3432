use std::sync::Arc;

use pi::{ContainerRef, ExecApi, ExecOptions, ExitPolicy, LocalStreams, RemoteClient, TerminalController, run_exec};
use pi_protocol::Pod;
use pi_runtime::Connection;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::ExecArgs;
use crate::config::Settings;
use crate::error::{CliError, Result};

/// Container chosen for a pod, plus the notice to show when it was defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerChoice {
	pub name: String,
	pub notice: Option<String>,
}

/// Picks the target container, rejecting pods that already completed.
pub fn choose_container(pod: &Pod, requested: Option<&str>) -> Result<ContainerChoice> {
	if let Some(phase) = pod.status.phase.as_ref().filter(|p| p.is_completed()) {
		return Err(CliError::Usage(format!(
			"cannot exec into a container in a completed pod; current phase is {phase}"
		)));
	}

	if let Some(name) = requested {
		return Ok(ContainerChoice {
			name: name.to_string(),
			notice: None,
		});
	}

	let containers = &pod.spec.containers;
	let first = containers
		.first()
		.ok_or_else(|| CliError::Usage(format!("pod {} has no containers", pod.metadata.name)))?;
	let notice = (containers.len() > 1).then(|| format!("Defaulting container name to {}.", first.name));
	Ok(ContainerChoice {
		name: first.name.clone(),
		notice,
	})
}

/// Cancels `token` on Ctrl-C until dropped.
struct InterruptHook(JoinHandle<()>);

impl InterruptHook {
	fn install(token: CancellationToken) -> Self {
		Self(tokio::spawn(async move {
			tokio::select! {
				result = tokio::signal::ctrl_c() => {
					if result.is_ok() {
						debug!(target = "pi.exec", "interrupt received");
						token.cancel();
					}
				}
				_ = token.cancelled() => {}
			}
		}))
	}
}

impl Drop for InterruptHook {
	fn drop(&mut self) {
		self.0.abort();
	}
}

pub async fn execute(args: ExecArgs, settings: &Settings) -> Result<()> {
	let connection = Connection::new(settings.connection_config())?;
	let client = RemoteClient::new(connection);

	let pod = client.get_pod(&args.pod).await?;
	let container = choose_container(&pod, args.container.as_deref())?;
	if let Some(notice) = &container.notice {
		eprintln!("{notice}");
	}
	info!(target = "pi.exec", pod = %args.pod, container = %container.name, "exec target resolved");

	let options = ExecOptions {
		container: ContainerRef {
			pod: args.pod,
			container: container.name,
		},
		command: args.command,
		stdin: args.stdin,
		tty: args.tty,
		detach: args.detach,
		exit_policy: ExitPolicy::default(),
	};
	let streams = LocalStreams::stdio(args.stdin && !args.detach);
	let api: Arc<dyn ExecApi> = Arc::new(client);
	let terminal = Arc::new(TerminalController::stdio());

	let interrupt = CancellationToken::new();
	let _hook = InterruptHook::install(interrupt.clone());

	run_exec(api, terminal, options, streams, interrupt).await?;
	Ok(())
}
