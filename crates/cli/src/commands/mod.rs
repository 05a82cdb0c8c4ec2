//! Command implementations and the setup they share.

pub mod git;
pub mod headless;
pub mod interactive;
pub mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use quill_agent::AgentLoop;
use quill_config::{AppConfig, ConfigError, save_user_overrides, validate_model};
use quill_providers::GrokClient;
use tracing::debug;

pub const MISSING_API_KEY: &str =
    "API key required. Set GROK_API_KEY, use --api-key, or save to ~/.quill/config.toml";

/// Connection and limit flags shared by the default command and
/// `git commit-and-push`.
#[derive(Args, Debug, Default)]
pub struct SessionArgs {
    /// Set the working directory
    #[arg(short = 'd', long)]
    pub directory: Option<PathBuf>,

    /// Grok API key (saved to user settings)
    #[arg(short = 'k', long)]
    pub api_key: Option<String>,

    /// API base URL (saved to user settings)
    #[arg(short = 'u', long)]
    pub base_url: Option<String>,

    /// Model to use
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Maximum tool execution rounds per message [default: 400]
    #[arg(long)]
    pub max_tool_rounds: Option<usize>,
}

impl SessionArgs {
    /// Change into `--directory`, if given, before anything reads the cwd.
    pub fn enter_directory(&self) -> anyhow::Result<()> {
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)
                .with_context(|| format!("Error changing directory to {}", dir.display()))?;
        }
        Ok(())
    }

    /// Apply the flags over loaded settings and re-check the result.
    pub fn apply(&self, config: &mut AppConfig) -> Result<(), ConfigError> {
        if let Some(key) = &self.api_key {
            config.api_key = Some(key.clone());
        }
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(model) = &self.model {
            validate_model(model, &config.models)?;
            config.model = model.clone();
        }
        if let Some(rounds) = self.max_tool_rounds {
            config.max_tool_rounds = rounds;
        }
        config.validate()
    }

    /// Load settings with flags applied on top. Prints the missing-key
    /// message and returns `None` when no API key is available.
    pub fn load_config(&self) -> anyhow::Result<Option<AppConfig>> {
        let cwd = std::env::current_dir().context("Failed to read the working directory")?;
        let mut config = AppConfig::load(&cwd).context("Failed to load settings")?;
        self.apply(&mut config)?;

        if !config.has_api_key() {
            eprintln!("{MISSING_API_KEY}");
            return Ok(None);
        }

        if self.api_key.is_some() || self.base_url.is_some() {
            save_user_overrides(
                &AppConfig::user_config_path(),
                self.api_key.as_deref(),
                self.base_url.as_deref(),
            )
            .context("Failed to save user settings")?;
        }
        Ok(Some(config))
    }
}

/// Build the Grok client and an agent rooted at the current directory.
pub fn build_agent(config: &AppConfig, appended_prompt: Option<String>) -> anyhow::Result<AgentLoop> {
    let api_key = config.api_key.clone().unwrap_or_default();
    let client = GrokClient::new(
        &config.base_url,
        api_key,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    debug!(model = %config.model, base_url = %config.base_url, cwd = %cwd.display(), "Building agent");
    Ok(AgentLoop::from_config(
        Arc::new(client),
        config,
        cwd,
        appended_prompt,
    ))
}
