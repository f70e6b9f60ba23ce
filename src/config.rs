//! Configuration management

use std::{
    env,
    path::{Path, PathBuf},
};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    /// Variables are set into the process environment for `${VAR}` resolution.
    pub env_files: Vec<String>,
    /// Key rotation settings
    pub rotation: RotationConfig,
    /// Key store location
    pub store: StoreConfig,
}

/// Key rotation settings, fixed for the lifetime of a manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Bit length of newly generated RSA keys
    pub key_length: u32,
    /// Days an active key may sign before it is retired
    pub max_age_days: u32,
    /// Days a retired key stays published before it is deleted
    pub expiration_hold_days: u32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            key_length: 4096,
            max_age_days: 90,
            expiration_hold_days: 7,
        }
    }
}

/// Key store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON key store (supports `~` and `${VAR}`)
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "~/.oidc-key-manager/keys.json".to_string(),
        }
    }
}

impl StoreConfig {
    /// The store path with a leading `~` replaced by the home directory.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.path))
    }
}

fn expand_home(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.display().to_string(), 1);
        }
    }
    path.to_string()
}

impl Config {
    /// Load configuration from an optional YAML file and `KEY_MANAGER_*`
    /// environment variables (nested keys separated by `__`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // e.g. KEY_MANAGER_ROTATION__MAX_AGE_DAYS=30
        // The CLI owns the flat KEY_MANAGER_{CONFIG,STORE,LOG_*} variables.
        figment = figment.merge(
            Env::prefixed("KEY_MANAGER_")
                .ignore(&["config", "store", "log_level", "log_format"])
                .split("__"),
        );

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Reject settings no pass could run with.
    pub fn validate(&self) -> Result<()> {
        if self.store.path.trim().is_empty() {
            return Err(Error::Config("store.path must not be empty".to_string()));
        }
        // key_length is checked by the generator, which owns what it can produce
        Ok(())
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = expand_home(path_str);
            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in config values
    fn expand_env_vars(&mut self) {
        // Pattern: ${VAR} or ${VAR:-default}
        let Ok(re) = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") else {
            return;
        };
        self.store.path = Self::expand_string(&re, &self.store.path);
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}
