//! Configuration loading, layering, and validation for Quill.
//!
//! Settings are resolved from, lowest to highest priority: built-in
//! defaults, the user file `~/.quill/config.toml`, the project file
//! `./.quill/settings.toml`, and `GROK_*` / `MORPH_API_KEY` environment
//! variables. CLI flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";
pub const DEFAULT_MODEL: &str = "grok-code-fast-1";

const USER_FILE: &str = "config.toml";
const PROJECT_FILE: &str = "settings.toml";
const INSTRUCTIONS_FILE: &str = "QUILL.md";

/// The user-level configuration structure.
///
/// Maps directly to `~/.quill/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the chat-completions endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used when none is given on the command line
    #[serde(default = "default_model")]
    pub model: String,

    /// Model names offered to the user and accepted by validation
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Productive (tool-executing) rounds allowed per user message
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Model calls allowed per user message
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Enables the `edit_file` fast-apply tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub morph_api_key: Option<String>,

    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_model() -> String {
    DEFAULT_MODEL.into()
}
fn default_models() -> Vec<String> {
    [
        "grok-code-fast-1",
        "grok-4-latest",
        "grok-3-latest",
        "grok-3-fast",
        "grok-3-mini-fast",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    64_000
}
fn default_max_tool_rounds() -> usize {
    400
}
fn default_max_turns() -> usize {
    500
}
fn default_request_timeout_secs() -> u64 {
    360
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("models", &self.models)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .field("max_turns", &self.max_turns)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("morph_api_key", &redact(&self.morph_api_key))
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

/// Where finished spans go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryExporter {
    #[default]
    Otlp,
    Console,
    None,
}

/// Tracing export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub exporter: TelemetryExporter,

    /// OTLP collector base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_service_version")]
    pub service_version: String,

    /// Fraction of sessions recorded, in [0, 1]
    #[serde(default = "default_sample_ratio")]
    pub trace_sample_ratio: f64,
}

fn default_endpoint() -> String {
    "http://localhost:4317".into()
}
fn default_service_name() -> String {
    "quill".into()
}
fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}
fn default_sample_ratio() -> f64 {
    1.0
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            exporter: TelemetryExporter::default(),
            endpoint: default_endpoint(),
            service_name: default_service_name(),
            service_version: default_service_version(),
            trace_sample_ratio: default_sample_ratio(),
        }
    }
}

/// Partial telemetry settings a project file may override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exporter: Option<TelemetryExporter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Per-project settings, `./.quill/settings.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<TelemetryOverrides>,
}

impl ProjectSettings {
    pub fn path_in(project_dir: &Path) -> PathBuf {
        project_dir.join(".quill").join(PROJECT_FILE)
    }

    /// Load the project file under `project_dir`. Missing means empty.
    pub fn load_from(project_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(project_dir);
        match read_optional(&path)? {
            Some(content) => toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path,
                reason: e.to_string(),
            }),
            None => Ok(Self::default()),
        }
    }

    pub fn save_to(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let path = Self::path_in(project_dir);
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::WriteError {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        write_file(&path, &content)
    }
}

impl AppConfig {
    /// Load every layer for the current user and working directory.
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        Self::load_layered(
            &Self::user_config_path(),
            project_dir,
            |key| std::env::var(key).ok(),
        )
    }

    /// Load with explicit paths and environment lookup.
    pub fn load_layered(
        user_path: &Path,
        project_dir: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(user_path)?;
        config.apply_project(&ProjectSettings::load_from(project_dir)?);
        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    /// Load the user file alone. Missing means defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let Some(content) = read_optional(path)? else {
            tracing::debug!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        };

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn apply_project(&mut self, project: &ProjectSettings) {
        if let Some(model) = &project.model {
            self.model = model.clone();
        }
        if let Some(base_url) = &project.base_url {
            self.base_url = base_url.clone();
        }
        if let Some(t) = &project.telemetry {
            if let Some(enabled) = t.enabled {
                self.telemetry.enabled = enabled;
            }
            if let Some(exporter) = t.exporter {
                self.telemetry.exporter = exporter;
            }
            if let Some(endpoint) = &t.endpoint {
                self.telemetry.endpoint = endpoint.clone();
            }
        }
    }

    /// Apply `GROK_*` and `MORPH_API_KEY` overrides.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GROK_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(url) = non_empty("GROK_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = non_empty("GROK_MODEL") {
            self.model = model;
        }
        match non_empty("GROK_MAX_TOKENS").map(|v| v.trim().parse::<u32>()) {
            Some(Ok(n)) if n > 0 => self.max_tokens = n,
            Some(_) => tracing::warn!("Ignoring GROK_MAX_TOKENS: expected a positive integer"),
            None => {}
        }
        if let Some(key) = non_empty("MORPH_API_KEY") {
            self.morph_api_key = Some(key);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".quill")
    }

    pub fn user_config_path() -> PathBuf {
        Self::config_dir().join(USER_FILE)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "max_tool_rounds must be at least 1".into(),
            ));
        }
        if self.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "max_turns must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.telemetry.trace_sample_ratio) {
            return Err(ConfigError::ValidationError(
                "telemetry.trace_sample_ratio must be between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn morph_enabled(&self) -> bool {
        self.morph_api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            models: default_models(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_tool_rounds: default_max_tool_rounds(),
            max_turns: default_max_turns(),
            request_timeout_secs: default_request_timeout_secs(),
            morph_api_key: None,
            telemetry: TelemetrySettings::default(),
        }
    }
}

/// Accept a model that is known or looks like a Grok model name.
pub fn validate_model(name: &str, known: &[String]) -> Result<(), ConfigError> {
    if known.iter().any(|m| m == name) || name.starts_with("grok-") {
        return Ok(());
    }
    Err(ConfigError::InvalidModel {
        name: name.to_string(),
        valid: known.join(", "),
    })
}

/// Persist an API key and/or base URL given on the command line into the
/// user file, keeping every other key already there.
pub fn save_user_overrides(
    path: &Path,
    api_key: Option<&str>,
    base_url: Option<&str>,
) -> Result<(), ConfigError> {
    if api_key.is_none() && base_url.is_none() {
        return Ok(());
    }

    let mut table: toml::Table = match read_optional(path)? {
        Some(content) => content.parse().map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?,
        None => toml::Table::new(),
    };

    if let Some(key) = api_key {
        table.insert("api_key".into(), toml::Value::String(key.into()));
    }
    if let Some(url) = base_url {
        table.insert("base_url".into(), toml::Value::String(url.into()));
    }

    let content = toml::to_string_pretty(&table).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    write_file(path, &content)?;
    tracing::debug!(path = %path.display(), "Saved user settings");
    Ok(())
}

/// Turn telemetry on or off for the project rooted at `project_dir`.
pub fn set_project_telemetry(project_dir: &Path, enabled: bool) -> Result<PathBuf, ConfigError> {
    let mut settings = ProjectSettings::load_from(project_dir)?;
    settings.telemetry.get_or_insert_with(TelemetryOverrides::default).enabled = Some(enabled);
    settings.save_to(project_dir)?;
    Ok(ProjectSettings::path_in(project_dir))
}

/// Custom instructions: `./.quill/QUILL.md`, then `~/.quill/QUILL.md`.
pub fn load_custom_instructions(cwd: &Path) -> Option<String> {
    load_custom_instructions_from(&[
        cwd.join(".quill").join(INSTRUCTIONS_FILE),
        AppConfig::config_dir().join(INSTRUCTIONS_FILE),
    ])
}

fn load_custom_instructions_from(candidates: &[PathBuf]) -> Option<String> {
    candidates.iter().find_map(|path| {
        let content = std::fs::read_to_string(path).ok()?;
        let trimmed = content.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), ConfigError> {
    let write_err = |e: std::io::Error| ConfigError::WriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, content).map_err(write_err)
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Failed to write config file at {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid model: {name}. Valid models: {valid}")]
    InvalidModel { name: String, valid: String },
}
