use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Overrides;

#[derive(Parser, Debug)]
#[command(name = "pi")]
#[command(about = "pi - run commands in remote containers")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file to read instead of ~/.pi/config
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// API host, e.g. tcp://*.hyper.sh:443
	#[arg(long, global = true, value_name = "HOST")]
	pub host: Option<String>,

	/// Region substituted into wildcard hosts and used for signing
	#[arg(long, global = true)]
	pub region: Option<String>,

	/// Config context to use instead of current-context
	#[arg(long, global = true)]
	pub context: Option<String>,

	/// Skip TLS certificate verification
	#[arg(long, global = true)]
	pub insecure_skip_tls_verify: bool,

	#[command(subcommand)]
	pub command: Commands,
}

impl Cli {
	pub fn overrides(&self) -> Overrides {
		Overrides {
			host: self.host.clone(),
			region: self.region.clone(),
			context: self.context.clone(),
			insecure_skip_tls_verify: self.insecure_skip_tls_verify,
		}
	}
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Execute a command in a container
	Exec(ExecArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ExecArgs {
	/// Pod to run the command in
	pub pod: String,

	/// Container name; defaults to the pod's first container
	#[arg(short, long)]
	pub container: Option<String>,

	/// Pass stdin to the container
	#[arg(short = 'i', long)]
	pub stdin: bool,

	/// Allocate a TTY for the command
	#[arg(short, long)]
	pub tty: bool,

	/// Start the command without attaching to it
	#[arg(short, long)]
	pub detach: bool,

	/// Command and arguments, usually after `--`
	#[arg(required = true, trailing_var_arg = true, value_name = "COMMAND")]
	pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn exec_args(args: &[&str]) -> ExecArgs {
		let cli = Cli::try_parse_from(args).unwrap();
		match cli.command {
			Commands::Exec(args) => args,
		}
	}

	#[test]
	fn parse_interactive_exec() {
		let args = exec_args(&["pi", "exec", "web", "-c", "app", "-i", "-t", "--", "sh", "-c", "echo hi"]);
		assert_eq!(args.pod, "web");
		assert_eq!(args.container.as_deref(), Some("app"));
		assert!(args.stdin && args.tty && !args.detach);
		assert_eq!(args.command, vec!["sh", "-c", "echo hi"]);
	}

	#[test]
	fn parse_combined_short_flags() {
		let args = exec_args(&["pi", "exec", "-it", "web", "--", "bash"]);
		assert!(args.stdin && args.tty);
		assert_eq!(args.container, None);
		assert_eq!(args.command, vec!["bash"]);
	}

	#[test]
	fn parse_detached_exec_without_separator() {
		let args = exec_args(&["pi", "exec", "-d", "web", "date"]);
		assert!(args.detach);
		assert_eq!(args.command, vec!["date"]);
	}

	#[test]
	fn missing_command_is_a_usage_error() {
		assert!(Cli::try_parse_from(["pi", "exec", "web"]).is_err());
	}

	#[test]
	fn missing_pod_is_a_usage_error() {
		assert!(Cli::try_parse_from(["pi", "exec"]).is_err());
	}

	#[test]
	fn global_flags_become_overrides() {
		let cli = Cli::try_parse_from([
			"pi",
			"-vv",
			"--host",
			"http://127.0.0.1:8080",
			"exec",
			"--region",
			"eu-central-1",
			"--insecure-skip-tls-verify",
			"web",
			"--",
			"ls",
		])
		.unwrap();
		assert_eq!(cli.verbose, 2);
		let overrides = cli.overrides();
		assert_eq!(overrides.host.as_deref(), Some("http://127.0.0.1:8080"));
		assert_eq!(overrides.region.as_deref(), Some("eu-central-1"));
		assert!(overrides.insecure_skip_tls_verify);
		assert_eq!(overrides.context, None);
	}
}
