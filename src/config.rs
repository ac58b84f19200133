//! Configuration loading and validation.
//!
//! Loads `config.toml` from `--config`, `$EDITOR_BRIDGE_CONFIG_PATH`, or
//! `~/.editor-bridge/config.toml`. A missing file yields defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::kernel::directory::InstallerConfig;
use crate::kernel::AppData;
use crate::origin::OriginValidator;

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "EDITOR_BRIDGE_CONFIG_PATH";
/// Env var overriding `[origin].pattern`.
pub const ORIGIN_REGEX_ENV: &str = "EDITOR_BRIDGE_ORIGIN_REGEX";
/// Env var overriding `[origin].exact`.
pub const ORIGIN_ENV: &str = "EDITOR_BRIDGE_ORIGIN";
/// Env var overriding `[kernel].root`.
pub const KERNEL_ROOT_ENV: &str = "EDITOR_BRIDGE_ROOT";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which editor origins may issue commands.
    pub origin: OriginConfig,
    /// Workspace kernel settings.
    pub kernel: KernelConfig,
    /// Bridge runtime settings.
    pub bridge: BridgeConfig,
    /// Initial app payload. The built-in hello-world app when absent.
    pub app: Option<AppData>,
}

/// Origin authorization. `pattern` wins when both are set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Regular expression searched in the sender origin.
    pub pattern: Option<String>,
    /// Exact origin, e.g. `https://editor.example.com`.
    pub exact: Option<String>,
}

impl OriginConfig {
    /// Build the validator this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns an error if the governing pattern or origin is invalid.
    pub fn validator(&self) -> anyhow::Result<OriginValidator> {
        OriginValidator::from_parts(self.pattern.as_deref(), self.exact.as_deref())
            .context("invalid [origin] configuration")
    }
}

/// Workspace kernel configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Workspace directory. Defaults to `~/.editor-bridge/workspace`.
    pub root: Option<PathBuf>,
    /// Package installer. Installs are rejected when unset.
    pub installer: Option<InstallerConfig>,
}

/// Bridge runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Undelivered messages buffered by the transport.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Seconds in-flight operations get to finish on shutdown.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl BridgeConfig {
    /// Drain timeout as a [`Duration`].
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

// Default value functions for serde

fn default_channel_capacity() -> usize {
    64
}
fn default_drain_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Load configuration with precedence env vars > file > defaults.
    ///
    /// `explicit` takes priority over `$EDITOR_BRIDGE_CONFIG_PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => config_path_with(env)?,
        };
        let mut config = load_config(&path)?;
        config.apply_overrides(env);
        Ok(config)
    }

    /// Apply environment overrides.
    ///
    /// Takes a resolver function for testability (avoids `set_var` in tests).
    /// Setting either origin variable replaces the whole `[origin]` section.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        let pattern = env(ORIGIN_REGEX_ENV).filter(|v| !v.is_empty());
        let exact = env(ORIGIN_ENV).filter(|v| !v.is_empty());
        if pattern.is_some() || exact.is_some() {
            self.origin = OriginConfig { pattern, exact };
        }

        if let Some(root) = env(KERNEL_ROOT_ENV).filter(|v| !v.is_empty()) {
            self.kernel.root = Some(PathBuf::from(root));
        }
    }

    /// Workspace root, falling back to `~/.editor-bridge/workspace`.
    ///
    /// # Errors
    ///
    /// Returns an error if no root is configured and the home directory
    /// cannot be determined.
    pub fn kernel_root(&self) -> anyhow::Result<PathBuf> {
        match &self.kernel.root {
            Some(root) => Ok(root.clone()),
            None => Ok(config_dir()?.join("workspace")),
        }
    }
}

/// Load the config file at `path`, returning defaults if it does not exist.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            tracing::info!(path = %path.display(), "loading config from file");
            Config::from_toml(&contents)
                .with_context(|| format!("failed to parse config at {}", path.display()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(anyhow::anyhow!(
            "failed to read config at {}: {e}",
            path.display()
        )),
    }
}

/// Resolve the config path using a custom env resolver.
///
/// # Errors
///
/// Returns an error if the variable is unset and the home directory cannot
/// be determined.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<PathBuf> {
    if let Some(p) = env(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir()?.join("config.toml"))
}

/// Resolve the default config directory (`~/.editor-bridge/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".editor-bridge"))
}
