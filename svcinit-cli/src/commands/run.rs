use std::process::ExitCode;

use svcinit::Launcher;

use crate::cli::{GlobalFlags, RunArgs};

/// Start the managed service, bootstrap it and exit with its status.
pub async fn execute(args: RunArgs, _global: &GlobalFlags) -> anyhow::Result<ExitCode> {
    let options = args.to_options()?;
    let command = args.service_command();

    tracing::info!(
        program = %command.program().display(),
        base_url = %options.probe_url,
        "Starting managed service"
    );

    let outcome = Launcher::new(options, command).run().await?;

    if let Err(e) = &outcome.bootstrap {
        eprintln!("error[{}]: bootstrap failed: {}", e.kind(), e);
    }

    tracing::info!(
        child_exit_code = outcome.child_exit_code,
        exit_code = outcome.exit_code,
        "Managed service exited"
    );

    Ok(ExitCode::from(clamp_exit_code(outcome.exit_code)))
}

/// Map a process status to the 0..=255 range an exit code can carry.
pub(crate) fn clamp_exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
