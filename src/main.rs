use clap::Parser;

use wsgate::adapter::inbound::cli::command::{Cli, Commands};
use wsgate::adapter::inbound::cli::output::{self, OutputConfig};
use wsgate::adapter::inbound::cli::{config, serve, status, tune};
use wsgate::application::tuner::Severity;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    output::configure(OutputConfig::new(cli.json, cli.quiet, cli.verbose));

    let result: anyhow::Result<i32> = match &cli.command {
        Commands::Serve(args) => serve::execute(args).await.map(|()| 0).map_err(Into::into),
        Commands::Tune(arg) => tune::execute(arg)
            .map(|worst| if worst == Severity::Critical { 2 } else { 0 })
            .map_err(Into::into),
        Commands::CheckConfig(arg) => config::execute(arg).map(|()| 0).map_err(Into::into),
        Commands::Status(args) => status::execute(args).map(|()| 0).map_err(Into::into),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            output::error(&format!("{e:#}"));
            std::process::exit(1);
        }
    }
}
