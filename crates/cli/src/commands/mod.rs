pub mod exec;

use crate::cli::{Cli, Commands};
use crate::config;
use crate::error::{CliError, Result};

pub async fn dispatch(cli: Cli) -> Result<()> {
	let overrides = cli.overrides();
	match cli.command {
		Commands::Exec(args) => {
			let settings = config::load(cli.config.as_deref(), &overrides).map_err(CliError::Config)?;
			exec::execute(args, &settings).await
		}
	}
}
