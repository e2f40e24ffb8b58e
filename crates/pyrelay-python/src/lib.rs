//! Host bridge to an embedded Python interpreter and a worker process
//!
//! The bridge runs code in two places:
//! 1. in-process, in the interpreter embedded in the host ([`in_process`])
//! 2. in a separately installed worker interpreter, reached through a relay
//!    server that itself runs in the embedded interpreter ([`supervisor`],
//!    [`relay`])
//!
//! [`Session`] is the entry point. It initializes each side on demand and
//! keeps them ready across calls.
//!
//! ```no_run
//! use pyrelay_config::SettingsStore;
//! use pyrelay_python::{PyEngine, RemoteArgs, Session, SessionOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = SettingsStore::at(SettingsStore::default_path(None)?);
//! let mut session = Session::new(PyEngine::new(), settings, SessionOptions::default());
//! session.run_string("print('hello from the host')")?;
//! session.start(None)?;
//! session.call_remote_operation("ping", &RemoteArgs::None)?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod errors;
pub mod in_process;
pub mod process;
pub mod py_engine;
pub mod relay;
pub mod resources;
pub mod search_path;
pub mod session;
pub mod stage;
pub mod supervisor;
pub mod validator;

#[cfg(test)]
mod test_support;

pub use engine::{AttrValue, Engine};
pub use errors::{BridgeError, InstallError, ScriptExecutionError};
pub use py_engine::PyEngine;
pub use relay::{RelayAbi, RelayCommand, RemoteArgs};
pub use session::{Session, SessionOptions, DEFAULT_REQUIRED_VERSION};
pub use stage::Stage;
pub use supervisor::WorkerHandle;
pub use validator::{InterpreterValidator, ValidationOutcome, ValidationResult};
