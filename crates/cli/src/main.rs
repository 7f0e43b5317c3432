use clap::Parser;
use pi_cli::{cli::Cli, commands, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::dispatch(cli).await {
		let code = err.report(&mut std::io::stderr());
		std::process::exit(code);
	}
}
