//! The bridge context object
//!
//! A [`Session`] is built once at host startup and owns everything the
//! bridge keeps between calls: the settings store, the embedded engine and
//! the worker supervisor. Entry points take `&mut self`, so callers on
//! several threads have to serialize access themselves.
//!
//! Dropping the session is the host-exit path: a worker that is still
//! running gets stopped.

use crate::engine::Engine;
use crate::errors::BridgeError;
use crate::in_process::EngineBridge;
use crate::relay::{RelayAbi, RelayCommand, RemoteArgs};
use crate::resources::default_client_init;
use crate::search_path::{self, SearchPathLayout};
use crate::stage::Stage;
use crate::supervisor::{WorkerHandle, WorkerSupervisor};
use crate::validator::{InterpreterValidator, ValidationResult};
use pyrelay_config::{ExecutableResolver, SettingsStore};
use pyrelay_logger as logger;
use std::env;
use std::path::{Path, PathBuf};

/// Interpreter version required when none is given
pub const DEFAULT_REQUIRED_VERSION: &str = "3.12";

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Base for relative paths and home of the project-local module directory
    pub project_root: Option<PathBuf>,
    /// Package directory shipped with the host
    pub builtin_site_packages: Option<PathBuf>,
    /// `major.minor` both interpreters must report
    pub required_version: String,
    /// Directories searched for bare interpreter names before `PATH`
    pub interpreter_search_roots: Vec<PathBuf>,
    pub relay: RelayAbi,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            project_root: None,
            builtin_site_packages: None,
            required_version: DEFAULT_REQUIRED_VERSION.to_string(),
            interpreter_search_roots: Vec::new(),
            relay: RelayAbi::default(),
        }
    }
}

impl SessionOptions {
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    pub fn with_builtin_site_packages(mut self, dir: impl Into<PathBuf>) -> Self {
        self.builtin_site_packages = Some(dir.into());
        self
    }

    pub fn with_required_version(mut self, version: impl Into<String>) -> Self {
        self.required_version = version.into();
        self
    }

    pub fn with_interpreter_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.interpreter_search_roots.push(root.into());
        self
    }

    pub fn with_relay(mut self, relay: RelayAbi) -> Self {
        self.relay = relay;
        self
    }
}

pub struct Session<E: Engine> {
    options: SessionOptions,
    settings: SettingsStore,
    validator: InterpreterValidator,
    bridge: EngineBridge<E>,
    supervisor: WorkerSupervisor,
}

impl<E: Engine> Session<E> {
    pub fn new(engine: E, settings: SettingsStore, options: SessionOptions) -> Self {
        let base_dir = options
            .project_root
            .clone()
            .or_else(|| env::current_dir().ok())
            .unwrap_or_default();
        let resolver = options
            .interpreter_search_roots
            .iter()
            .fold(ExecutableResolver::new(base_dir), |resolver, root| {
                resolver.with_search_root(root)
            });
        let validator = InterpreterValidator::new(resolver, options.required_version.clone());

        Self {
            options,
            settings,
            validator,
            bridge: EngineBridge::new(engine),
            supervisor: WorkerSupervisor::new(),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn settings(&mut self) -> &mut SettingsStore {
        &mut self.settings
    }

    pub fn engine(&self) -> &E {
        self.bridge.engine()
    }

    pub fn in_process_stage(&self) -> &Stage {
        self.bridge.stage()
    }

    pub fn out_of_process_stage(&self) -> &Stage {
        self.supervisor.stage()
    }

    /// The running relay server, if started
    pub fn worker(&self) -> Option<&WorkerHandle> {
        self.supervisor.handle()
    }

    /// The module search path installed in the embedded engine
    pub fn search_path(&self) -> &[String] {
        self.bridge.search_path()
    }

    /// The file `module` would be imported from in the embedded engine
    pub fn locate_module(&self, module: &str) -> Option<PathBuf> {
        search_path::locate_module(self.bridge.search_path(), module)
    }

    fn layout(&mut self) -> SearchPathLayout {
        SearchPathLayout {
            project_root: self.options.project_root.clone(),
            builtin_site_packages: self.options.builtin_site_packages.clone(),
            user_site_packages: self.settings.get().extra_site_packages.clone(),
        }
    }

    pub fn ensure_in_process_ready(&mut self) -> Result<(), BridgeError> {
        let layout = self.layout();
        self.bridge
            .ensure_ready(&layout, &self.options.required_version)?;
        Ok(())
    }

    pub fn ensure_out_of_process_ready(&mut self) -> Result<(), BridgeError> {
        let layout = self.layout();
        let config = self.settings.get().clone();
        self.supervisor.ensure_ready(
            &mut self.bridge,
            &layout,
            &config,
            &self.validator,
            &self.options.relay,
        )?;
        Ok(())
    }

    /// Run `code` in the embedded engine
    pub fn run_string(&mut self, code: &str) -> Result<(), BridgeError> {
        self.ensure_in_process_ready()?;
        self.bridge.exec_string(code)?;
        Ok(())
    }

    /// Run the file at `path` in the embedded engine
    pub fn run_file(&mut self, path: &Path) -> Result<(), BridgeError> {
        let path = self.existing_file(path)?;
        self.ensure_in_process_ready()?;
        self.bridge.exec_file(&path)
    }

    /// Start the relay server; the worker runs `client_init` on startup
    pub fn start(&mut self, client_init: Option<&Path>) -> Result<(), BridgeError> {
        let client_init = client_init.map(|p| self.existing_file(p)).transpose()?;
        self.ensure_out_of_process_ready()?;
        self.supervisor
            .start(&mut self.bridge, &self.options.relay, client_init.as_deref())?;
        Ok(())
    }

    /// Start with the initialization script from the resource directory
    pub fn start_with_default_init(&mut self) -> Result<(), BridgeError> {
        let client_init = default_client_init()?;
        self.start(Some(&client_init))
    }

    /// Stop the relay server, and the worker process if `terminate_worker`
    pub fn stop(&mut self, terminate_worker: bool) -> Result<(), BridgeError> {
        if self.supervisor.stage() == &Stage::Stopped {
            logger::debug("Worker already stopped");
            return Ok(());
        }
        self.ensure_out_of_process_ready()?;
        self.supervisor
            .stop(&mut self.bridge, &self.options.relay, terminate_worker)?;
        Ok(())
    }

    /// Terminate the worker and start it again from scratch
    pub fn reinitialize(&mut self, client_init: Option<&Path>) -> Result<(), BridgeError> {
        self.stop(true)?;
        self.start(client_init)
    }

    /// Run `code` on the worker
    pub fn run_on_worker(&mut self, code: &str) -> Result<(), BridgeError> {
        self.relay(&RelayCommand::RunCode {
            code: code.to_string(),
        })
    }

    /// Run the file at `path` on the worker
    pub fn run_file_on_worker(&mut self, path: &Path) -> Result<(), BridgeError> {
        let path = self.existing_file(path)?;
        self.relay(&RelayCommand::RunFile { path })
    }

    /// Invoke the named operation on the worker without waiting for a result
    pub fn call_remote_operation(
        &mut self,
        name: &str,
        args: &RemoteArgs,
    ) -> Result<(), BridgeError> {
        self.relay(&RelayCommand::CallService {
            name: name.to_string(),
            args: args.clone(),
        })
    }

    fn relay(&mut self, command: &RelayCommand) -> Result<(), BridgeError> {
        self.ensure_out_of_process_ready()?;
        self.supervisor
            .relay(&mut self.bridge, &self.options.relay, command)?;
        Ok(())
    }

    /// Classify the configured worker interpreter without initializing anything
    pub fn validate_configured_interpreter(&mut self) -> ValidationResult {
        let config = self.settings.get();
        let candidate = config.effective_interpreter().to_string();
        let timeout = config.validation_timeout();
        self.validator.validate(&candidate, timeout)
    }

    /// Host-exit teardown; runs at most once per start
    pub fn host_exit(&mut self) {
        if self.supervisor.take_host_exit_hook() {
            logger::debug("Host exit: stopping worker");
            self.supervisor
                .force_stop(&mut self.bridge, &self.options.relay);
        }
    }

    /// Engine teardown: stops a started worker and forgets both stages
    pub fn shutdown_engine(&mut self) {
        if self.supervisor.take_engine_shutdown_hook() {
            logger::debug("Engine shutdown: stopping worker");
            self.supervisor
                .force_stop(&mut self.bridge, &self.options.relay);
        }
        self.supervisor.reset();
        self.bridge.reset();
    }

    fn existing_file(&self, path: &Path) -> Result<PathBuf, BridgeError> {
        let absolute = self.validator.resolver().absolutize(path);
        if absolute.is_file() {
            Ok(absolute)
        } else {
            Err(BridgeError::FileNotFound(path.to_path_buf()))
        }
    }
}

impl<E: Engine> Drop for Session<E> {
    fn drop(&mut self) {
        self.host_exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InstallError;
    use crate::search_path::PROJECT_SITE_PACKAGES;
    use crate::test_support::ScriptedEngine;
    use std::fs;
    use tempfile::TempDir;

    fn ready_engine(version: &str) -> ScriptedEngine {
        ScriptedEngine::new(version)
            .with_module("rpyc")
            .with_module("relay_rpyc.relay_server")
    }

    fn session_in(
        dir: &Path,
        engine: ScriptedEngine,
        interpreter: &str,
        required: &str,
    ) -> Session<ScriptedEngine> {
        let mut settings = SettingsStore::at(dir.join("pyrelay.toml"));
        settings.update(|config| {
            config.interpreter_path = interpreter.to_string();
            config.validation_timeout_ms = 5000;
        });
        let options = SessionOptions::default()
            .with_project_root(dir)
            .with_required_version(required);
        Session::new(engine, settings, options)
    }

    fn count_matching(log: &[String], needle: &str) -> usize {
        log.iter().filter(|code| code.contains(needle)).count()
    }

    #[test]
    fn test_run_file_missing_fails_before_initializing() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let mut session = session_in(temp_dir.path(), ready_engine("3.12.1"), "", "3.12");
        let Err(err) = session.run_file(Path::new("scripts/missing.py")) else {
            panic!("missing file must fail");
        };
        assert!(matches!(err, BridgeError::FileNotFound(_)));
        assert_eq!(session.engine().initialize_calls, 0);
        assert_eq!(session.in_process_stage(), &Stage::Uninitialized);
    }

    #[test]
    fn test_project_module_shadows_builtin() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let root = temp_dir.path();
        let project_copy = root.join(PROJECT_SITE_PACKAGES).join("tools.py");
        let builtin_dir = root.join("builtin");
        let Some(project_dir) = project_copy.parent() else {
            return;
        };
        assert!(fs::create_dir_all(project_dir).is_ok());
        assert!(fs::create_dir_all(&builtin_dir).is_ok());
        assert!(fs::write(&project_copy, "").is_ok());
        assert!(fs::write(builtin_dir.join("tools.py"), "").is_ok());

        let settings = SettingsStore::at(root.join("pyrelay.toml"));
        let options = SessionOptions::default()
            .with_project_root(root)
            .with_builtin_site_packages(&builtin_dir);
        let mut session = Session::new(ready_engine("3.12.1"), settings, options);

        assert!(session.ensure_in_process_ready().is_ok());
        assert_eq!(session.locate_module("tools"), Some(project_copy));
        assert_eq!(
            session.search_path().last().map(String::as_str),
            Some(crate::test_support::SCRIPTED_DEFAULT_PATH)
        );
    }

    #[test]
    fn test_project_module_shadows_builtin_package() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let root = temp_dir.path();
        let project_copy = root.join(PROJECT_SITE_PACKAGES).join("tools.py");
        let builtin_dir = root.join("builtin");
        let Some(project_dir) = project_copy.parent() else {
            return;
        };
        assert!(fs::create_dir_all(project_dir).is_ok());
        assert!(fs::create_dir_all(builtin_dir.join("tools")).is_ok());
        assert!(fs::write(&project_copy, "").is_ok());
        assert!(fs::write(builtin_dir.join("tools").join("__init__.py"), "").is_ok());
        assert!(fs::write(builtin_dir.join("tools").join("render.py"), "").is_ok());

        let settings = SettingsStore::at(root.join("pyrelay.toml"));
        let options = SessionOptions::default()
            .with_project_root(root)
            .with_builtin_site_packages(&builtin_dir);
        let mut session = Session::new(ready_engine("3.12.1"), settings, options);

        assert!(session.ensure_in_process_ready().is_ok());
        assert_eq!(session.locate_module("tools"), Some(project_copy));
        assert_eq!(session.locate_module("tools.render"), None);
    }

    #[test]
    fn test_script_failure_is_returned() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let engine = ready_engine("3.12.1").failing_on("boom");
        let mut session = session_in(temp_dir.path(), engine, "", "3.12");
        let Err(BridgeError::Script(err)) = session.run_string("raise RuntimeError('boom')") else {
            panic!("payload failure must surface as a script error");
        };
        assert!(err.message.contains("boom"));
        assert!(err.stack_trace.contains("Traceback"));
        assert!(session.in_process_stage().is_ready());
    }

    #[cfg(unix)]
    mod worker {
        use super::*;
        use crate::test_support::{call_count, calls, fake_interpreter};

        fn started_session(dir: &Path) -> Session<ScriptedEngine> {
            let exe = fake_interpreter(dir, "python3", "3.12.1 (main)", 0);
            session_in(dir, ready_engine("3.12.1"), &exe.display().to_string(), "3.12")
        }

        #[test]
        fn test_ensure_out_of_process_is_idempotent() {
            let Ok(temp_dir) = TempDir::new() else {
                return;
            };
            let mut session = started_session(temp_dir.path());

            assert!(session.ensure_out_of_process_ready().is_ok());
            assert!(session.ensure_out_of_process_ready().is_ok());

            assert_eq!(call_count(temp_dir.path(), "python3"), 2);
            assert_eq!(calls(temp_dir.path(), "python3")[1], "-c import rpyc");
            assert!(session.in_process_stage().is_ready());
            assert!(session.out_of_process_stage().is_ready());
            assert!(session
                .engine()
                .attrs
                .contains_key("relay_rpyc.relay_server.python_executable"));
        }

        #[test]
        fn test_text_file_interpreter_is_rejected() {
            let Ok(temp_dir) = TempDir::new() else {
                return;
            };
            assert!(fs::write(temp_dir.path().join("notes.txt"), "just notes\n").is_ok());
            let mut session =
                session_in(temp_dir.path(), ready_engine("3.12.1"), "./notes.txt", "3.12");

            let Err(err) = session.ensure_out_of_process_ready() else {
                panic!("a text file is not an interpreter");
            };
            assert!(matches!(
                err,
                BridgeError::Install(InstallError::InterpreterNotExecutable { .. })
            ));
            assert!(err.to_string().contains("does not seem to be an executable file"));
            assert!(session.out_of_process_stage().is_failed());
        }

        #[test]
        fn test_wrong_worker_version_fails_before_spawning_worker() {
            let Ok(temp_dir) = TempDir::new() else {
                return;
            };
            let exe = fake_interpreter(temp_dir.path(), "python", "3.9.0", 0);
            let mut session = session_in(
                temp_dir.path(),
                ready_engine("2.7.18"),
                &exe.display().to_string(),
                "2.7",
            );

            let Err(err) = session.ensure_out_of_process_ready() else {
                panic!("3.9.0 must not satisfy 2.7");
            };
            let msg = err.to_string();
            assert!(msg.contains("2.7") && msg.contains("3.9.0"));
            assert_eq!(call_count(temp_dir.path(), "python"), 1);
            assert!(!session.out_of_process_stage().is_ready());
        }

        #[test]
        fn test_start_then_call_without_explicit_ensure() {
            let Ok(temp_dir) = TempDir::new() else {
                return;
            };
            let init = temp_dir.path().join("init.script");
            assert!(fs::write(&init, "print('client up')\n").is_ok());
            let mut session = started_session(temp_dir.path());

            assert!(session.start(Some(Path::new("init.script"))).is_ok());
            assert!(session.call_remote_operation("ping", &RemoteArgs::None).is_ok());

            let log = session.engine().executed();
            assert_eq!(log.len(), 2);
            assert!(log[0].contains(&format!("relay_server.start('{}')", init.display())));
            assert!(log[1].contains("relay_server.call_remote_service('ping', None)"));
            assert_eq!(session.worker().map(|w| w.generation), Some(1));
        }

        #[test]
        fn test_stop_then_start_rebuilds_the_worker() {
            let Ok(temp_dir) = TempDir::new() else {
                return;
            };
            let mut session = started_session(temp_dir.path());

            assert!(session.start(None).is_ok());
            assert!(session.stop(true).is_ok());
            assert_eq!(session.out_of_process_stage(), &Stage::Stopped);
            assert!(session.worker().is_none());

            assert!(session.start(None).is_ok());
            assert_eq!(session.worker().map(|w| w.generation), Some(2));
            assert!(session.out_of_process_stage().is_ready());
            // validation and smoke test ran again after the stop
            assert_eq!(call_count(temp_dir.path(), "python3"), 4);
        }

        #[test]
        fn test_stop_when_stopped_is_a_no_op() {
            let Ok(temp_dir) = TempDir::new() else {
                return;
            };
            let mut session = started_session(temp_dir.path());
            assert!(session.stop(false).is_ok());
            assert!(session.stop(true).is_ok());
            assert!(session.stop(true).is_ok());

            let log = session.engine().executed();
            assert_eq!(count_matching(&log, "relay_server.stop("), 2);
        }

        #[test]
        fn test_reinitialize_restarts_with_new_generation() {
            let Ok(temp_dir) = TempDir::new() else {
                return;
            };
            let mut session = started_session(temp_dir.path());
            assert!(session.start(None).is_ok());
            assert!(session.reinitialize(None).is_ok());
            assert_eq!(session.worker().map(|w| w.generation), Some(2));
        }

        #[test]
        fn test_missing_rpc_support_in_engine() {
            let Ok(temp_dir) = TempDir::new() else {
                return;
            };
            let exe = fake_interpreter(temp_dir.path(), "python3", "3.12.1", 0);
            let mut session = session_in(
                temp_dir.path(),
                ScriptedEngine::new("3.12.1"),
                &exe.display().to_string(),
                "3.12",
            );
            let Err(err) = session.ensure_out_of_process_ready() else {
                panic!("rpyc is not importable");
            };
            assert!(err.to_string().contains("install RPC support library"));
            assert_eq!(call_count(temp_dir.path(), "python3"), 1);
        }

        #[test]
        fn test_worker_without_rpc_support_fails_smoke_test() {
            let Ok(temp_dir) = TempDir::new() else {
                return;
            };
            let exe = fake_interpreter(temp_dir.path(), "python3", "3.12.1", 1);
            let mut session = session_in(
                temp_dir.path(),
                ready_engine("3.12.1"),
                &exe.display().to_string(),
                "3.12",
            );
            let Err(err) = session.ensure_out_of_process_ready() else {
                panic!("smoke test must fail");
            };
            assert!(err.to_string().contains("RPC library not importable by worker"));

            // nothing is cached: the next call starts over
            assert!(session.ensure_out_of_process_ready().is_err());
            assert_eq!(call_count(temp_dir.path(), "python3"), 4);
        }

        #[test]
        fn test_teardown_stops_worker_once() {
            let Ok(temp_dir) = TempDir::new() else {
                return;
            };
            let mut session = started_session(temp_dir.path());
            let log = session.engine().shared_log();

            assert!(session.start(None).is_ok());
            session.shutdown_engine();
            assert_eq!(session.in_process_stage(), &Stage::Uninitialized);
            assert_eq!(session.out_of_process_stage(), &Stage::Uninitialized);
            drop(session);

            assert_eq!(count_matching(&log.borrow(), "relay_server.stop(True)"), 1);
        }

        #[test]
        fn test_host_exit_stops_worker_on_drop() {
            let Ok(temp_dir) = TempDir::new() else {
                return;
            };
            let mut session = started_session(temp_dir.path());
            let log = session.engine().shared_log();
            assert!(session.ensure_out_of_process_ready().is_ok());
            drop(session);
            assert_eq!(count_matching(&log.borrow(), "relay_server.stop(True)"), 1);
        }

        #[test]
        fn test_relay_failure_after_ready_is_reported_on_call() {
            let Ok(temp_dir) = TempDir::new() else {
                return;
            };
            let exe = fake_interpreter(temp_dir.path(), "python3", "3.12.1", 0);
            let engine = ready_engine("3.12.1").failing_on("call_remote_service");
            let mut session =
                session_in(temp_dir.path(), engine, &exe.display().to_string(), "3.12");

            assert!(session.start(None).is_ok());
            let result = session.call_remote_operation("ping", &RemoteArgs::None);
            assert!(matches!(result, Err(BridgeError::Script(_))));
            assert!(session.out_of_process_stage().is_ready());
        }

        #[test]
        fn test_validate_configured_interpreter_does_not_initialize() {
            let Ok(temp_dir) = TempDir::new() else {
                return;
            };
            let mut session = started_session(temp_dir.path());
            let result = session.validate_configured_interpreter();
            assert!(result.is_valid());
            assert_eq!(result.short_version(), "3.12.1");
            assert_eq!(session.engine().initialize_calls, 0);
        }
    }
}
