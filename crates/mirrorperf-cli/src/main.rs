use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use mirrorperf_cli::{
    cli::{Cli, Commands},
    commands::{self, Exit},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise only our own crates log at the chosen level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = cli.level_filter().to_string().to_lowercase();
        EnvFilter::new(format!("mirrorperf={level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Run(args) => match commands::load_config(cli.config) {
            Ok(mut config) => {
                args.apply(&mut config);
                commands::run::execute(config).await
            }
            Err(err) => Err(err),
        },
        Commands::Analyze { dir, json } => commands::analyze::execute(dir, json).await,
        Commands::Compare { first, second } => commands::compare::execute(first, second).await,
        Commands::Config(cmd) => commands::config::execute(cli.config, cmd).await,
    };

    match outcome {
        Ok(exit) => exit.into(),
        Err(err) => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            commands::exit_for_error(&err).into()
        }
    }
}
