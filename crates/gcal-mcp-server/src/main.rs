//! gcal-mcp entry point.

use std::process::ExitCode;

use clap::Parser;

use gcal_mcp_core::{TracingConfig, init_tracing};
use gcal_mcp_server::cli::{AuthAction, Cli, Command, ConfigAction};
use gcal_mcp_server::commands;
use gcal_mcp_server::config::GcalConfig;
use gcal_mcp_server::error::CliResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(GcalConfig::default_path);
    let mut config = GcalConfig::load_from(&config_path)?;
    config.apply_env_overrides();

    let command = cli.selected_command().clone();
    let tracing = if cli.debug {
        TracingConfig::debug()
    } else if command == Command::Serve {
        config.logging.apply(TracingConfig::server())?
    } else {
        TracingConfig::cli()
    };
    init_tracing(tracing)?;

    match command {
        Command::Serve => {
            let service = commands::build_service(&config, &config_path)?;
            commands::serve::run(service).await
        }
        Command::Auth { action } => {
            let service = commands::build_service(&config, &config_path)?;
            let tokens = service.tokens();
            match action {
                AuthAction::Login { no_browser, force } => {
                    commands::auth::login(tokens, no_browser, force).await
                }
                AuthAction::Code { code } => commands::auth::code(tokens, &code).await,
                AuthAction::Status => commands::auth::status(tokens).await,
                AuthAction::Logout => commands::auth::logout(tokens).await,
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Path => commands::config::path(&config, &config_path),
        },
    }
}
