//! Persisted worker settings
//!
//! The store loads lazily on first access and never fails on bad persisted
//! state: a missing, unreadable or corrupt file yields default settings with
//! an empty interpreter path. Writes only happen through [`SettingsStore::save`].

use crate::executable::DEFAULT_INTERPRETER;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment override for the settings file location
pub const SETTINGS_ENV_VAR: &str = "PYRELAY_SETTINGS";

/// Settings file location relative to a project root
pub const PROJECT_SETTINGS_FILE: &str = "ProjectSettings/pyrelay.toml";

/// Timeout used when none (or zero) is configured
pub const DEFAULT_VALIDATION_TIMEOUT_MS: u64 = 1000;

/// Keys accepted by [`WorkerConfig::get`] and [`WorkerConfig::set`]
pub const SETTINGS_KEYS: &[&str] = &[
    "interpreter-path",
    "extra-site-packages",
    "validation-timeout-ms",
];

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown settings key: {0}. Supported keys: interpreter-path, extra-site-packages, validation-timeout-ms")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Could not determine the user configuration directory")]
    NoConfigDir,
}

/// Worker interpreter configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct WorkerConfig {
    /// Interpreter for the worker process; empty means the system default
    pub interpreter_path: String,
    /// Module search directories placed ahead of the defaults, in order
    pub extra_site_packages: Vec<String>,
    /// Upper bound for interpreter validation
    pub validation_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interpreter_path: String::new(),
            extra_site_packages: Vec::new(),
            validation_timeout_ms: DEFAULT_VALIDATION_TIMEOUT_MS,
        }
    }
}

impl WorkerConfig {
    /// The interpreter the worker will actually run
    pub fn effective_interpreter(&self) -> &str {
        if self.interpreter_path.is_empty() {
            DEFAULT_INTERPRETER
        } else {
            &self.interpreter_path
        }
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "interpreter-path" => Some(self.interpreter_path.clone()),
            "extra-site-packages" => env::join_paths(&self.extra_site_packages)
                .ok()
                .map(|joined| joined.to_string_lossy().into_owned()),
            "validation-timeout-ms" => Some(self.validation_timeout_ms.to_string()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        match key {
            "interpreter-path" => self.interpreter_path = value.trim().to_string(),
            "extra-site-packages" => {
                self.extra_site_packages = env::split_paths(value)
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect();
            }
            "validation-timeout-ms" => {
                let parsed: u64 =
                    value
                        .trim()
                        .parse()
                        .map_err(|e: std::num::ParseIntError| SettingsError::InvalidValue {
                            key: key.to_string(),
                            value: value.to_string(),
                            reason: e.to_string(),
                        })?;
                if parsed == 0 {
                    return Err(SettingsError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                        reason: "must be greater than zero".to_string(),
                    });
                }
                self.validation_timeout_ms = parsed;
            }
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn values_iter(&self) -> Vec<(&'static str, String)> {
        SETTINGS_KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .collect()
    }
}

/// Lazily loaded, explicitly saved settings
///
/// One store per session. Not synchronized: the host thread that owns the
/// session owns its settings.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    current: Option<WorkerConfig>,
    loaded_interpreter: Option<String>,
}

impl SettingsStore {
    /// Store backed by the file at `path` (not read until first access)
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: None,
            loaded_interpreter: None,
        }
    }

    /// Default settings file location
    ///
    /// `PYRELAY_SETTINGS` wins if set and non-empty. Otherwise the file lives
    /// in the project's `ProjectSettings` directory when a project root is
    /// known, or in the user config directory.
    pub fn default_path(project_root: Option<&Path>) -> Result<PathBuf, SettingsError> {
        if let Ok(env_path) = env::var(SETTINGS_ENV_VAR) {
            let trimmed = env_path.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }

        if let Some(root) = project_root {
            return Ok(root.join(PROJECT_SETTINGS_FILE));
        }

        #[cfg(not(target_os = "windows"))]
        let config_dir = dirs::home_dir()
            .ok_or(SettingsError::NoConfigDir)?
            .join(".config");

        #[cfg(target_os = "windows")]
        let config_dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;

        Ok(config_dir.join("pyrelay").join("pyrelay.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings, loading them on first access
    pub fn get(&mut self) -> &WorkerConfig {
        if self.current.is_none() {
            let loaded = Self::load(&self.path);
            self.loaded_interpreter = Some(loaded.effective_interpreter().to_string());
            self.current = Some(loaded);
        }
        self.current.get_or_insert_with(WorkerConfig::default)
    }

    /// Replace the settings (in memory only until [`save`](Self::save))
    pub fn set(&mut self, config: WorkerConfig) {
        self.get();
        self.current = Some(config);
    }

    /// Edit the settings in place (in memory only until [`save`](Self::save))
    pub fn update<F: FnOnce(&mut WorkerConfig)>(&mut self, edit: F) {
        self.get();
        if let Some(current) = self.current.as_mut() {
            edit(current);
        }
    }

    /// True when the effective interpreter differs from the one read from the
    /// settings file at first load, i.e. a running worker is stale
    pub fn interpreter_changed_since_persist(&mut self) -> bool {
        let current = self.get().effective_interpreter().to_string();
        self.loaded_interpreter.as_deref() != Some(current.as_str())
    }

    /// Write the settings file, creating its directory if needed
    ///
    /// The file is written to a sibling temporary file first and renamed over
    /// the target.
    pub fn save(&mut self) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(self.get())?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;

        info!("Settings saved to: {:?}", self.path);
        Ok(())
    }

    fn load(path: &Path) -> WorkerConfig {
        debug!("Loading settings from: {:?}", path);

        if !path.exists() {
            return WorkerConfig::default();
        }

        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                toml::from_str::<WorkerConfig>(&content).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(mut config) => {
                if config.validation_timeout_ms == 0 {
                    config.validation_timeout_ms = DEFAULT_VALIDATION_TIMEOUT_MS;
                }
                config
            }
            Err(e) => {
                warn!("Ignoring unreadable settings file {:?}: {}", path, e);
                WorkerConfig::default()
            }
        }
    }
}
