//! Common types and utilities shared across commands

use anyhow::Context;
use clap::Parser;
use pyrelay_config::SettingsStore;
use pyrelay_python::{PyEngine, Session, SessionOptions, DEFAULT_REQUIRED_VERSION};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Overrides the `major.minor` version both interpreters must report
pub const REQUIRED_PYTHON_ENV_VAR: &str = "PYRELAY_REQUIRED_PYTHON";

/// Global CLI options available to all commands
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    #[arg(short, long, global = true, help = "Decrease verbosity")]
    pub quiet: bool,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase verbosity (-v for debug, -vv for trace)")]
    pub verbose: u8,

    #[arg(
        long,
        global = true,
        help = "Show Python output on console (always logged to file)"
    )]
    pub log_python: bool,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Project root: base for relative paths, holds Python/site-packages"
    )]
    pub project: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Settings file (default: $PYRELAY_SETTINGS, the project settings, or ~/.config/pyrelay/pyrelay.toml)"
    )]
    pub settings: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Package directory shipped with the host, searched after the project directory"
    )]
    pub builtin_site_packages: Option<PathBuf>,
}

impl GlobalOpts {
    /// Get the effective verbosity level
    /// - 0: quiet/warn only
    /// - 1: debug (-v)
    /// - 2: trace (-vv)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    pub fn settings_path(&self) -> anyhow::Result<PathBuf> {
        match &self.settings {
            Some(path) => Ok(path.clone()),
            None => SettingsStore::default_path(self.project.as_deref())
                .context("Failed to locate the settings file"),
        }
    }

    pub fn settings_store(&self) -> anyhow::Result<SettingsStore> {
        Ok(SettingsStore::at(self.settings_path()?))
    }

    pub fn session_options(&self) -> SessionOptions {
        let required = env::var(REQUIRED_PYTHON_ENV_VAR)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_REQUIRED_VERSION.to_string());

        let mut options = SessionOptions::default().with_required_version(required);
        if let Some(root) = &self.project {
            options = options.with_project_root(root);
        }
        if let Some(dir) = &self.builtin_site_packages {
            options = options.with_builtin_site_packages(dir);
        }
        options
    }

    /// A session over the embedded interpreter; nothing is initialized yet
    pub fn open_session(&self) -> anyhow::Result<Session<PyEngine>> {
        let settings = self.settings_store()?;
        let options = self.session_options();
        tracing::debug!(
            settings = %settings.path().display(),
            required = %options.required_version,
            "opening session"
        );
        Ok(Session::new(PyEngine::new(), settings, options))
    }
}

/// Route `tracing` events from the library crates to stderr
///
/// `RUST_LOG` wins; otherwise the level follows `-v`.
pub fn init_tracing(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "pyrelay=warn,pyrelay_config=warn,pyrelay_python=warn",
        1 => "pyrelay=debug,pyrelay_config=debug,pyrelay_python=debug",
        _ => "pyrelay=trace,pyrelay_config=trace,pyrelay_python=trace",
    };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .try_init();
}
