//! OIDC Key Manager - rotates an OpenID Connect provider's RSA signing keys
//!
//! Meant to be run periodically; each run is one management pass.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use oidc_key_manager::{
    cli::{Cli, Command, OutputFormat},
    commands::{run_list, run_manage},
    config::Config,
    key_manager::KeyLifecycleManager,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(ref store) = cli.store {
                config.store.path = store.to_string_lossy().into_owned();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let manager = match KeyLifecycleManager::from_config(&config) {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to open key store: {e}");
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = std::io::stdout();
    match cli.command {
        Some(Command::List { format }) => run_list(&manager, format, &mut stdout).await,
        Some(Command::Manage { format }) => run_manage(&manager, format, &mut stdout).await,
        None => run_manage(&manager, OutputFormat::Text, &mut stdout).await,
    }
}
