//! Layered client configuration.
//!
//! Values are resolved from built-in defaults, then `config.toml` in the
//! user's config directory, then `FOUNDRY_*` environment variables, then
//! explicit overrides (command-line flags).

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

const APP_DIR: &str = "foundry";
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Resolved application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the game server, without a trailing slash.
    pub server_url: String,
    /// Delay between state polls.
    pub poll_interval_ms: u64,
    /// Where the player identity is persisted.
    pub identity_path: PathBuf,
    /// Per-request timeout; requests wait indefinitely when unset.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

/// Values supplied on the command line, applied last.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `--server`
    pub server_url: Option<String>,
    /// `--poll-ms`
    pub poll_interval_ms: Option<u64>,
    /// `--identity`
    pub identity_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the default file location.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        Self::load_from(config_path().as_deref(), overrides)
    }

    /// Load configuration, reading `path` when given and present.
    pub fn load_from(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("server_url", DEFAULT_SERVER_URL)?
            .set_default("poll_interval_ms", DEFAULT_POLL_INTERVAL_MS as i64)?
            .set_default(
                "identity_path",
                default_identity_path().to_string_lossy().into_owned(),
            )?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        let settings = builder
            .add_source(Environment::with_prefix("FOUNDRY").try_parsing(true))
            .set_override_option("server_url", overrides.server_url.clone())?
            .set_override_option(
                "poll_interval_ms",
                overrides.poll_interval_ms.map(|ms| ms as i64),
            )?
            .set_override_option(
                "identity_path",
                overrides
                    .identity_path
                    .as_ref()
                    .map(|path| path.to_string_lossy().into_owned()),
            )?
            .build()
            .context("failed to assemble configuration")?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("invalid configuration values")?;
        config.server_url = config.server_url.trim_end_matches('/').to_string();
        if config.poll_interval_ms == 0 {
            config.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        }
        Ok(config)
    }

    /// Poll period as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Request timeout as a [`Duration`], if configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Location of `config.toml`, if the platform has a config directory.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

/// Default identity file location.
pub fn default_identity_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".foundry"))
        .join("identity.json")
}

/// Write a commented default `config.toml` unless one already exists.
pub fn ensure_default_config() -> Result<()> {
    match config_path() {
        Some(path) => write_default_config(&path),
        None => Ok(()),
    }
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }

    let contents = format!(
        "# Foundry client settings. FOUNDRY_* environment variables and\n\
         # command-line flags take precedence over this file.\n\
         server_url = \"{DEFAULT_SERVER_URL}\"\n\
         poll_interval_ms = {DEFAULT_POLL_INTERVAL_MS}\n\
         # identity_path = \"/path/to/identity.json\"\n\
         # request_timeout_ms = 5000\n"
    );
    fs::write(path, contents)
        .with_context(|| format!("failed to write default config {}", path.display()))?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(())
}
