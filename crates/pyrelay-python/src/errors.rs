use pyrelay_config::SettingsError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by bridge entry points
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("No Python file found at {}", .0.display())]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Script(#[from] ScriptExecutionError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Environment or configuration problems that prevent initialization
///
/// Every message names the offending path or setting. Nothing here is
/// retried automatically: fix the configuration and call `ensure_*` again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    #[error("Python {required} is required but the embedded interpreter is {found}")]
    EngineVersion { required: String, found: String },

    #[error("Failed to initialize the embedded interpreter: {0}")]
    EngineInitialization(String),

    #[error("The worker interpreter setting is empty")]
    EmptyInterpreter,

    #[error("{path} does not seem to be an executable file. Make sure the path is exactly accurate.")]
    InterpreterNotFound { path: String },

    #[error("{path} does not seem to be an executable file or is not a working interpreter: {reason}")]
    InterpreterNotExecutable { path: String, reason: String },

    #[error("{path} took too long to run (over {timeout_ms} ms); either it's not Python, or increase validation-timeout-ms in the settings")]
    InterpreterTimedOut { path: String, timeout_ms: u64 },

    #[error("{path} should be version {required} but instead calls itself {found}")]
    InterpreterWrongVersion {
        path: String,
        required: String,
        found: String,
    },

    #[error("install RPC support library '{module}' where the embedded interpreter can import it")]
    MissingRpcSupport { module: String },

    #[error("Failed to configure relay server module '{module}': {reason}")]
    RelayServerUnavailable { module: String, reason: String },

    #[error("RPC library not importable by worker: install '{module}' for the worker interpreter '{path}'")]
    WorkerMissingRpcSupport { module: String, path: String },

    #[error("Unable to run worker interpreter '{path}': {reason}")]
    WorkerSpawn { path: String, reason: String },

    #[error("{var} was not found in the environment; it must name the resource directory that holds the worker initialization script")]
    ResourcePathUnset { var: String },
}

/// A payload raised while executing, in the host or on the worker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}\npython stack: {stack_trace}")]
pub struct ScriptExecutionError {
    pub message: String,
    pub stack_trace: String,
}

impl ScriptExecutionError {
    /// Build from a message and a raw traceback, normalizing escaped newlines
    pub fn new(message: impl Into<String>, raw_stack_trace: &str) -> Self {
        Self {
            message: message.into(),
            stack_trace: normalize_stack_trace(raw_stack_trace),
        }
    }

    /// A failure that happened before anything was executed
    pub fn without_trace(message: impl Into<String>) -> Self {
        Self::new(message, "")
    }
}

fn normalize_stack_trace(raw: &str) -> String {
    raw.replace("\\n", "\n")
        .replace("\r\n", "\n")
        .trim_end()
        .to_string()
}

/// Generic conversion from PyErr, for failures outside script execution.
///
/// NOTE: This conversion loses the Python traceback information!
/// Script payload failures go through `PyEngine::exec`, which keeps it.
impl From<pyo3::PyErr> for InstallError {
    fn from(err: pyo3::PyErr) -> Self {
        InstallError::EngineInitialization(format!("{}", err))
    }
}
