//! JSON payloads for pod lookup and the exec endpoints.

use serde::{Deserialize, Serialize};

/// Body of the exec-create call.
///
/// Field names match the service's camelCase schema, e.g.:
/// ```json
/// {
///   "user": "",
///   "privileged": false,
///   "tty": true,
///   "attachStdin": true,
///   "attachStderr": true,
///   "attachStdout": true,
///   "detach": false,
///   "detachKeys": "",
///   "cmd": ["sh", "-c", "echo hi"]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecConfig {
	/// User that will run the command
	#[serde(default)]
	pub user: String,
	/// Whether the command runs privileged
	#[serde(default)]
	pub privileged: bool,
	/// Attach standard streams to a TTY
	#[serde(default)]
	pub tty: bool,
	#[serde(default)]
	pub attach_stdin: bool,
	#[serde(default)]
	pub attach_stderr: bool,
	#[serde(default)]
	pub attach_stdout: bool,
	/// Run without any attached stream
	#[serde(default)]
	pub detach: bool,
	/// Escape keys for detach
	#[serde(default)]
	pub detach_keys: String,
	/// Command and arguments
	pub cmd: Vec<String>,
}

/// Response of the exec-create call.
///
/// The service has historically spelled the identifier `Id`, `ID` and `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCreateResponse {
	#[serde(default, alias = "Id", alias = "ID")]
	pub id: String,
	#[serde(default, alias = "Warnings", skip_serializing_if = "Vec::is_empty")]
	pub warnings: Vec<String>,
}

/// Body of the attach (hijacked start) call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachOptions {
	pub tty: bool,
}

/// Body of the detached start call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecStartCheck {
	pub detach: bool,
	pub tty: bool,
}

/// Response of the exec-inspect call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecInspect {
	#[serde(default, alias = "Running")]
	pub running: bool,
	#[serde(default, alias = "ExitCode")]
	pub exit_code: i32,
}

/// Terminal dimensions forwarded to a TTY session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeOptions {
	pub height: u16,
	pub width: u16,
}

impl ResizeOptions {
	/// A `0x0` reading means there is no controlling terminal.
	pub fn is_empty(&self) -> bool {
		self.height == 0 && self.width == 0
	}
}

/// Pod lifecycle phase, as reported in `status.phase`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
	Pending,
	Running,
	Succeeded,
	Failed,
	#[serde(other)]
	Unknown,
}

impl PodPhase {
	/// Completed pods can no longer host new exec sessions.
	pub fn is_completed(&self) -> bool {
		matches!(self, PodPhase::Succeeded | PodPhase::Failed)
	}
}

impl std::fmt::Display for PodPhase {
	/// Variant names match the wire spelling.
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		std::fmt::Debug::fmt(self, f)
	}
}

/// The subset of a pod object needed to target an exec session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
	#[serde(default)]
	pub metadata: PodMetadata,
	#[serde(default)]
	pub spec: PodSpec,
	#[serde(default)]
	pub status: PodStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodMetadata {
	#[serde(default)]
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSpec {
	#[serde(default)]
	pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub phase: Option<PodPhase>,
}
