use anyhow::Result;
use clap::Parser;
use tabrelay_cli::cli::{Cli, Commands};
use tabrelay_cli::{client, config, logging, server};

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	match cli.command {
		Commands::Serve(args) => {
			let config = config::resolve(&args)?;
			server::run(config).await
		}
		Commands::Send(args) => client::send(&args).await,
	}
}
