//! `quill telemetry enable|disable`

use std::process::ExitCode;

use anyhow::Context;
use quill_config::set_project_telemetry;

pub fn run(enabled: bool) -> anyhow::Result<ExitCode> {
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    let path = set_project_telemetry(&cwd, enabled)?;
    let state = if enabled { "enabled" } else { "disabled" };
    println!("Telemetry {state} ({})", path.display());
    Ok(ExitCode::SUCCESS)
}
