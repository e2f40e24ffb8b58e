//! Worker supervision
//!
//! The worker process is spawned and addressed by the relay server running
//! inside the embedded engine, so the supervisor mostly prepares that server
//! and tracks what it has been told to do. `ensure_ready` runs these steps,
//! each failing with its own [`InstallError`]:
//!
//! 1. validate the configured worker interpreter
//! 2. check the RPC support library is importable in the engine
//! 3. hand the worker executable and search path to the relay server
//! 4. smoke-test that the worker can import the RPC support library
//! 5. arm the host-exit hook
//!
//! A worker that dies after reaching `Ready` is not watched; the next relay
//! call fails with the server's error instead.

use crate::engine::{AttrValue, Engine};
use crate::errors::{InstallError, ScriptExecutionError};
use crate::in_process::EngineBridge;
use crate::process::run_with_deadline;
use crate::relay::{RelayAbi, RelayCommand, EXECUTABLE_ATTR, SEARCH_PATH_ATTR};
use crate::search_path::SearchPathLayout;
use crate::stage::Stage;
use crate::validator::InterpreterValidator;
use chrono::{DateTime, Local};
use pyrelay_config::WorkerConfig;
use pyrelay_logger as logger;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

/// The smoke test may take this many validation timeouts
const SMOKE_TEST_TIMEOUT_FACTOR: u32 = 10;

/// A started relay server and the worker it supervises
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    pub executable: PathBuf,
    pub client_init: Option<PathBuf>,
    /// Increases with every start; a restarted worker never reuses a handle
    pub generation: u64,
    pub started_at: DateTime<Local>,
}

#[derive(Debug, Default)]
pub struct WorkerSupervisor {
    stage: Stage,
    worker_executable: Option<PathBuf>,
    handle: Option<WorkerHandle>,
    generation: u64,
    host_exit_armed: bool,
    engine_shutdown_armed: bool,
}

impl WorkerSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn handle(&self) -> Option<&WorkerHandle> {
        self.handle.as_ref()
    }

    /// The validated worker interpreter, once ready
    pub fn worker_executable(&self) -> Option<&Path> {
        self.worker_executable.as_deref()
    }

    /// Make the worker usable, initializing the engine first if needed
    pub fn ensure_ready<E: Engine>(
        &mut self,
        bridge: &mut EngineBridge<E>,
        layout: &SearchPathLayout,
        config: &WorkerConfig,
        validator: &InterpreterValidator,
        abi: &RelayAbi,
    ) -> Result<(), InstallError> {
        bridge.ensure_ready(layout, validator.required_version())?;
        if self.stage.is_ready() {
            return Ok(());
        }

        self.stage = Stage::Initializing;
        match self.initialize(bridge, config, validator, abi) {
            Ok(executable) => {
                logger::debug(&format!("Worker interpreter ready: {}", executable.display()));
                self.worker_executable = Some(executable);
                self.host_exit_armed = true;
                self.stage = Stage::Ready;
                Ok(())
            }
            Err(e) => {
                self.stage = Stage::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn initialize<E: Engine>(
        &mut self,
        bridge: &mut EngineBridge<E>,
        config: &WorkerConfig,
        validator: &InterpreterValidator,
        abi: &RelayAbi,
    ) -> Result<PathBuf, InstallError> {
        let timeout = config.validation_timeout();
        let validation = validator.validate(config.effective_interpreter(), timeout);
        if let Some(err) = validation.install_error(validator.required_version(), timeout) {
            return Err(err);
        }
        let executable = validation.resolved_path;

        if !bridge.engine_mut().can_import(&abi.support_module) {
            return Err(InstallError::MissingRpcSupport {
                module: abi.support_module.clone(),
            });
        }

        let extra_dirs = bridge.extra_dirs().to_vec();
        let relay_unavailable = |e: ScriptExecutionError| InstallError::RelayServerUnavailable {
            module: abi.server_module.clone(),
            reason: e.message,
        };
        let engine = bridge.engine_mut();
        engine
            .set_module_attr(
                &abi.server_module,
                EXECUTABLE_ATTR,
                AttrValue::Str(executable.to_string_lossy().into_owned()),
            )
            .map_err(relay_unavailable)?;
        engine
            .set_module_attr(
                &abi.server_module,
                SEARCH_PATH_ATTR,
                AttrValue::StrList(extra_dirs.clone()),
            )
            .map_err(relay_unavailable)?;

        smoke_test(&executable, &extra_dirs, &abi.support_module, config)?;
        Ok(executable)
    }

    /// Launch the relay server, which spawns the worker
    ///
    /// The caller makes sure the supervisor is ready. Starting while a server
    /// is already running leaves it untouched.
    pub fn start<E: Engine>(
        &mut self,
        bridge: &mut EngineBridge<E>,
        abi: &RelayAbi,
        client_init: Option<&Path>,
    ) -> Result<(), ScriptExecutionError> {
        if let Some(handle) = &self.handle {
            logger::warn(&format!(
                "Relay server already running (generation {}); stop it before starting again",
                handle.generation
            ));
            return Ok(());
        }
        let Some(executable) = self.worker_executable.clone() else {
            return Err(ScriptExecutionError::without_trace(
                "The worker is not initialized",
            ));
        };

        let command = RelayCommand::Start {
            client_init: client_init.map(Path::to_path_buf),
        };
        bridge.exec_relay(abi, &command)?;

        self.generation += 1;
        self.handle = Some(WorkerHandle {
            executable,
            client_init: client_init.map(Path::to_path_buf),
            generation: self.generation,
            started_at: Local::now(),
        });
        self.engine_shutdown_armed = true;
        logger::info(&format!("Relay server started (generation {})", self.generation));
        Ok(())
    }

    /// Stop the relay server, and the worker too if `terminate_worker`
    pub fn stop<E: Engine>(
        &mut self,
        bridge: &mut EngineBridge<E>,
        abi: &RelayAbi,
        terminate_worker: bool,
    ) -> Result<(), ScriptExecutionError> {
        let command = RelayCommand::Stop { terminate_worker };
        bridge.exec_relay(abi, &command)?;

        self.handle = None;
        self.engine_shutdown_armed = false;
        if terminate_worker {
            self.host_exit_armed = false;
            self.stage = Stage::Stopped;
        }
        logger::debug(&format!(
            "Relay server stopped (terminate worker: {})",
            terminate_worker
        ));
        Ok(())
    }

    /// Relay a request to the worker
    pub fn relay<E: Engine>(
        &mut self,
        bridge: &mut EngineBridge<E>,
        abi: &RelayAbi,
        command: &RelayCommand,
    ) -> Result<(), ScriptExecutionError> {
        bridge.exec_relay(abi, command)
    }

    /// Disarm and report the host-exit hook
    pub fn take_host_exit_hook(&mut self) -> bool {
        std::mem::take(&mut self.host_exit_armed)
    }

    /// Disarm and report the engine-shutdown hook
    pub fn take_engine_shutdown_hook(&mut self) -> bool {
        std::mem::take(&mut self.engine_shutdown_armed)
    }

    /// Stop everything from a teardown hook; errors are logged only
    ///
    /// Both hooks are disarmed, so whichever fires second does nothing.
    pub fn force_stop<E: Engine>(&mut self, bridge: &mut EngineBridge<E>, abi: &RelayAbi) {
        self.host_exit_armed = false;
        self.engine_shutdown_armed = false;
        if let Err(e) = self.stop(bridge, abi, true) {
            logger::warn(&format!("Failed to stop the worker during teardown: {}", e.message));
        }
        self.handle = None;
        self.stage = Stage::Stopped;
    }

    /// Forget everything, e.g. after the engine was shut down
    pub fn reset(&mut self) {
        self.stage = Stage::Uninitialized;
        self.worker_executable = None;
        self.handle = None;
        self.host_exit_armed = false;
        self.engine_shutdown_armed = false;
    }
}

fn smoke_test(
    executable: &Path,
    extra_dirs: &[String],
    support_module: &str,
    config: &WorkerConfig,
) -> Result<(), InstallError> {
    let path = executable.display().to_string();
    let timeout = config.validation_timeout() * SMOKE_TEST_TIMEOUT_FACTOR;

    let mut command = Command::new(executable);
    command.args(["-c", &format!("import {}", support_module)]);
    if !extra_dirs.is_empty() {
        let joined = env::join_paths(extra_dirs).map_err(|e| InstallError::WorkerSpawn {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        command.env("PYTHONPATH", joined);
    }

    logger::debug(&format!("Smoke-testing worker {} (timeout {:?})", path, timeout));
    let output = run_with_deadline(command, timeout).map_err(|e| InstallError::WorkerSpawn {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    if output.timed_out {
        return Err(InstallError::WorkerSpawn {
            path,
            reason: format!("timed out after {:?}", timeout),
        });
    }
    logger::capture_output(
        &format!("{} -c 'import {}'", path, support_module),
        output.status.code(),
        &output.stdout,
        &output.stderr,
    );
    if !output.status.success() {
        return Err(InstallError::WorkerMissingRpcSupport {
            module: support_module.to_string(),
            path,
        });
    }
    Ok(())
}
