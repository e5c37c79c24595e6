use std::process::ExitCode;

use clap::Args;
use serde::Serialize;
use svcinit::VolumeLock;

use crate::cli::{BootstrapFlags, GlobalFlags};

#[derive(Args, Debug, Clone, Default)]
pub struct CredentialArgs {
    #[command(flatten)]
    pub bootstrap: BootstrapFlags,

    /// Print the secret itself
    #[arg(long)]
    pub show_secret: bool,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct CredentialInfo<'a> {
    username: &'a str,
    path: String,
    created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret: Option<&'a str>,
}

/// Create the credential file unless it exists, then describe it.
pub async fn execute(args: CredentialArgs, _global: &GlobalFlags) -> anyhow::Result<ExitCode> {
    let options = args.bootstrap.to_options()?;
    options.validate()?;

    let store = options.credential_store();
    let _lock = VolumeLock::acquire(store.dir())?;

    let created = !store.exists();
    let credential = store.ensure_credential()?;

    let info = CredentialInfo {
        username: &credential.username,
        path: store.path().display().to_string(),
        created,
        secret: args.show_secret.then(|| credential.secret.expose()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("username: {}", info.username);
        println!("path:     {}", info.path);
        if let Some(secret) = info.secret {
            println!("secret:   {}", secret);
        }
    }

    if created {
        tracing::info!(path = %info.path, "Created admin credential");
    }

    Ok(ExitCode::SUCCESS)
}
