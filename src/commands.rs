//! Command implementations behind the CLI
//!
//! Each command renders its report to the given writer and maps the outcome
//! to the process exit code. Errors go to stderr and the log.

use std::fmt::Display;
use std::io::Write;
use std::process::ExitCode;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::cli::OutputFormat;
use crate::key_manager::KeyLifecycleManager;

/// Run one management pass and print its report.
///
/// Fails if the pass fails, after printing the current key status if it can
/// still be read.
pub async fn run_manage(
    manager: &KeyLifecycleManager,
    format: OutputFormat,
    out: &mut impl Write,
) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        key_length = manager.rotation().key_length,
        max_age_days = manager.rotation().max_age_days,
        expiration_hold_days = manager.rotation().expiration_hold_days,
        "Running key management pass"
    );

    match manager.run_management_pass().await {
        Ok(report) => {
            for violation in &report.violations {
                warn!(%violation, "Key left untouched");
            }
            print_report(&report, format, out)
        }
        Err(e) => {
            error!("Key management pass failed: {e}");
            eprintln!("Error: {e}");

            // Best effort: show what the store looks like now
            match manager.status_report().await {
                Ok(status) => {
                    let _ = print_report(&status, format, out);
                }
                Err(e) => warn!("Could not produce key status report: {e}"),
            }
            ExitCode::FAILURE
        }
    }
}

/// Print the status of every key.
pub async fn run_list(
    manager: &KeyLifecycleManager,
    format: OutputFormat,
    out: &mut impl Write,
) -> ExitCode {
    match manager.status_report().await {
        Ok(status) => print_report(&status, format, out),
        Err(e) => {
            error!("Failed to list keys: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_report<T: Serialize + Display>(
    report: &T,
    format: OutputFormat,
    out: &mut impl Write,
) -> ExitCode {
    let rendered = match format {
        OutputFormat::Text => Ok(report.to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .map(|json| format!("{json}\n"))
            .map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(report).map_err(|e| e.to_string()),
    };

    let written = rendered.and_then(|text| {
        out.write_all(text.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| e.to_string())
    });

    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Failed to render report: {e}");
            ExitCode::FAILURE
        }
    }
}
