//! Log setup for the `pi` binary.

use tracing_subscriber::EnvFilter;

/// Level for the pi crates at a given `-v` count.
pub fn level_for(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	}
}

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(verbosity: u8) -> String {
	let level = level_for(verbosity);
	format!("warn,pi={level},pi_runtime={level},pi_protocol={level},pi_cli={level}")
}

/// Installs a stderr `fmt` subscriber. `RUST_LOG` wins over `-v`.
pub fn init_logging(verbosity: u8) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(verbosity >= 2)
		.try_init();
}
