mod cli;
mod commands;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use svcinit_shared::errors::InitError;

use crate::cli::{Cli, Commands};
use crate::commands::run::clamp_exit_code;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match logging::init_logging(cli.global.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Some(Commands::Run(args)) => commands::run::execute(args, &cli.global).await,
        Some(Commands::Credential(args)) => commands::credential::execute(args, &cli.global).await,
        None => commands::run::execute(cli.run, &cli.global).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => report_error(&e),
    }
}

fn report_error(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<InitError>() {
        Some(init_err) => {
            eprintln!("error[{}]: {}", init_err.kind(), init_err);
            ExitCode::from(clamp_exit_code(init_err.exit_code()))
        }
        None => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
