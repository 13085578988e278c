use clap::{CommandFactory, Parser};
use tracing::error;

use grizzly_cli::adapter::inbound::cli::command::{Cli, Commands, DistCommand};
use grizzly_cli::adapter::inbound::cli::output::{self, OutputConfig};
use grizzly_cli::adapter::inbound::cli::{dist, markdown};
use grizzly_cli::config::logging::LoggingConfig;
use grizzly_cli::error::{Error, Result};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    output::configure(OutputConfig::new(cli.json, cli.quiet, cli.verbose), &cli.color);
    LoggingConfig::from_flags(cli.log_level.as_deref(), cli.verbose, cli.json_logs).init();

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(Error::Feature(diagnostic)) => {
            eprintln!("{:?}", miette::Report::new(diagnostic));
            1
        }
        Err(Error::Aborted) => {
            output::warning("aborted by user");
            1
        }
        Err(e) => {
            error!(error = %e, "Fatal error");
            output::error(&e.to_string());
            1
        }
    };

    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> Result<i32> {
    if cli.md_help {
        print!("{}", markdown::render(Cli::command()));
        return Ok(0);
    }

    match cli.command {
        Some(Commands::Dist(DistCommand::Run(args))) => dist::run(&args).await,
        Some(Commands::Dist(DistCommand::Compose(args))) => dist::compose(&args).map(|()| 0),
        None => {
            Cli::command().print_help()?;
            Ok(2)
        }
    }
}
