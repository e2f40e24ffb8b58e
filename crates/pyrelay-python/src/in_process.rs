//! In-process engine bridge
//!
//! Owns the embedded interpreter and its initialization stage. Initializing
//! checks the interpreter version and installs the module search order from
//! [`crate::search_path`] before any user code runs.

use crate::engine::Engine;
use crate::errors::{BridgeError, InstallError, ScriptExecutionError};
use crate::relay::{RelayAbi, RelayCommand};
use crate::search_path::{merge_search_path, SearchPathLayout};
use crate::stage::Stage;
use crate::validator::{short_version, version_matches};
use pyrelay_logger as logger;
use std::fs;
use std::path::Path;

pub struct EngineBridge<E: Engine> {
    engine: E,
    stage: Stage,
    extra_dirs: Vec<String>,
    search_path: Vec<String>,
}

impl<E: Engine> EngineBridge<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            stage: Stage::Uninitialized,
            extra_dirs: Vec::new(),
            search_path: Vec::new(),
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Directories placed ahead of the interpreter defaults at initialization
    pub fn extra_dirs(&self) -> &[String] {
        &self.extra_dirs
    }

    /// The full module search path installed at initialization
    pub fn search_path(&self) -> &[String] {
        &self.search_path
    }

    /// Initialize the engine unless it is already ready
    pub fn ensure_ready(
        &mut self,
        layout: &SearchPathLayout,
        required_version: &str,
    ) -> Result<(), InstallError> {
        if self.stage.is_ready() {
            return Ok(());
        }

        self.stage = Stage::Initializing;
        match self.initialize(layout, required_version) {
            Ok(()) => {
                self.stage = Stage::Ready;
                Ok(())
            }
            Err(e) => {
                self.stage = Stage::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn initialize(
        &mut self,
        layout: &SearchPathLayout,
        required_version: &str,
    ) -> Result<(), InstallError> {
        let start = std::time::Instant::now();
        self.engine.initialize()?;

        let version = self.engine.version()?;
        if !version_matches(&version, required_version) {
            return Err(InstallError::EngineVersion {
                required: required_version.to_string(),
                found: short_version(&version).to_string(),
            });
        }

        let extra_dirs = layout.extra_dirs();
        let defaults = self.engine.default_search_path()?;
        let search_path = merge_search_path(&extra_dirs, &defaults);
        self.engine.install_search_path(&search_path)?;

        for (i, entry) in search_path.iter().enumerate() {
            logger::debug(&format!("sys.path[{}] = {}", i, entry));
        }
        logger::debug(&format!(
            "Embedded interpreter {} ready in {:?}",
            short_version(&version),
            start.elapsed()
        ));

        self.extra_dirs = extra_dirs;
        self.search_path = search_path;
        Ok(())
    }

    /// Execute a code string; failures are logged and returned
    pub fn exec_string(&mut self, code: &str) -> Result<(), ScriptExecutionError> {
        self.engine.exec(code, None).map_err(log_failure)
    }

    /// Render a relay command and execute it
    ///
    /// A command that cannot be rendered is logged like any other failure.
    pub fn exec_relay(
        &mut self,
        abi: &RelayAbi,
        command: &RelayCommand,
    ) -> Result<(), ScriptExecutionError> {
        let code = command.render(abi).map_err(log_failure)?;
        self.exec_string(&code)
    }

    /// Execute the contents of a file; failures are logged and returned
    pub fn exec_file(&mut self, path: &Path) -> Result<(), BridgeError> {
        if !path.is_file() {
            return Err(BridgeError::FileNotFound(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        self.engine
            .exec(&source, Some(path))
            .map_err(log_failure)
            .map_err(BridgeError::from)
    }

    /// Forget initialization, e.g. after the engine was shut down
    pub fn reset(&mut self) {
        self.stage = Stage::Uninitialized;
        self.extra_dirs.clear();
        self.search_path.clear();
    }
}

fn log_failure(err: ScriptExecutionError) -> ScriptExecutionError {
    logger::error(&err.to_string());
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedEngine;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_ready_is_idempotent() {
        let mut bridge = EngineBridge::new(ScriptedEngine::new("3.12.1 (scripted)"));
        let layout = SearchPathLayout::default();
        assert!(bridge.ensure_ready(&layout, "3.12").is_ok());
        assert!(bridge.ensure_ready(&layout, "3.12").is_ok());
        assert_eq!(bridge.engine().initialize_calls, 1);
        assert_eq!(bridge.stage(), &Stage::Ready);
    }

    #[test]
    fn test_version_mismatch_fails_and_retries() {
        let mut bridge = EngineBridge::new(ScriptedEngine::new("3.11.9 (scripted)"));
        let layout = SearchPathLayout::default();

        let Err(err) = bridge.ensure_ready(&layout, "3.12") else {
            panic!("3.11 must not satisfy 3.12");
        };
        assert_eq!(
            err,
            InstallError::EngineVersion {
                required: "3.12".to_string(),
                found: "3.11.9".to_string(),
            }
        );
        assert!(bridge.stage().is_failed());

        assert!(bridge.ensure_ready(&layout, "3.12").is_err());
        assert_eq!(bridge.engine().initialize_calls, 2);
    }

    #[test]
    fn test_search_path_puts_extras_before_defaults() {
        let mut bridge = EngineBridge::new(ScriptedEngine::new("3.12.1"));
        let layout = SearchPathLayout {
            builtin_site_packages: Some("/opt/host/site-packages".into()),
            user_site_packages: vec!["/home/user/libs".to_string()],
            ..Default::default()
        };
        assert!(bridge.ensure_ready(&layout, "3.12").is_ok());
        assert_eq!(
            bridge.engine().installed_path,
            vec![
                "/opt/host/site-packages",
                "/home/user/libs",
                "/usr/lib/python3.12"
            ]
        );
        assert_eq!(bridge.extra_dirs().len(), 2);
    }

    #[test]
    fn test_exec_file_missing_is_file_not_found() {
        let mut bridge = EngineBridge::new(ScriptedEngine::new("3.12.1"));
        let Err(err) = bridge.exec_file(Path::new("/nonexistent/payload.py")) else {
            panic!("missing file must fail");
        };
        assert!(matches!(err, BridgeError::FileNotFound(_)));
        assert!(bridge.engine().executed().is_empty());
    }

    #[test]
    fn test_exec_failure_is_returned_with_stack() {
        let mut bridge = EngineBridge::new(ScriptedEngine::new("3.12.1").failing_on("boom"));
        let Err(err) = bridge.exec_string("raise RuntimeError('boom')") else {
            panic!("payload should fail");
        };
        assert!(err.message.contains("boom"));
        assert!(!err.stack_trace.is_empty());
    }

    #[test]
    fn test_exec_file_passes_origin() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let script = temp_dir.path().join("payload.py");
        assert!(fs::write(&script, "print('hi')\n").is_ok());

        let mut bridge = EngineBridge::new(ScriptedEngine::new("3.12.1"));
        assert!(bridge.exec_file(&script).is_ok());
        assert_eq!(bridge.engine().executed(), vec!["print('hi')\n".to_string()]);
    }
}
