//! Relay control commands
//!
//! Requests for the worker are rendered into a short snippet that drives
//! the relay server module inside the embedded engine, then executed like
//! any other in-process payload. Failures therefore come back as
//! [`ScriptExecutionError`], whether they happened while rendering, in the
//! server, or on the worker.
//!
//! Raw execution (`RunCode`, `RunFile`) and named calls (`CallService`) are
//! separate commands; only the latter is part of the stable worker ABI.

use crate::errors::ScriptExecutionError;
use serde_json::Value;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Server attribute holding the worker interpreter path
pub const EXECUTABLE_ATTR: &str = "python_executable";

/// Server attribute holding the worker's extra module directories
pub const SEARCH_PATH_ATTR: &str = "extra_site_packages";

/// Module names the relay depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAbi {
    /// RPC library that both sides must be able to import
    pub support_module: String,
    /// Server module offering `start`, `stop` and `call_remote_service`
    pub server_module: String,
}

impl Default for RelayAbi {
    fn default() -> Self {
        Self {
            support_module: "rpyc".to_string(),
            server_module: "relay_rpyc.relay_server".to_string(),
        }
    }
}

/// Arguments of a named remote call, forwarded without interpretation
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RemoteArgs {
    #[default]
    None,
    /// A Python expression evaluated host-side before dispatch
    Python(String),
    /// A JSON document, decoded host-side before dispatch
    Json(Value),
}

impl RemoteArgs {
    fn render(&self) -> Result<String, ScriptExecutionError> {
        match self {
            RemoteArgs::None => Ok("None".to_string()),
            RemoteArgs::Python(expr) if expr.trim().is_empty() => Ok("None".to_string()),
            RemoteArgs::Python(expr) => Ok(format!("({})", expr.trim())),
            RemoteArgs::Json(value) => {
                let encoded = serde_json::to_string(value).map_err(|e| {
                    ScriptExecutionError::without_trace(format!(
                        "Failed to encode remote call arguments: {}",
                        e
                    ))
                })?;
                Ok(format!("json.loads({})", py_str_literal(&encoded)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayCommand {
    Start { client_init: Option<PathBuf> },
    Stop { terminate_worker: bool },
    RunCode { code: String },
    RunFile { path: PathBuf },
    CallService { name: String, args: RemoteArgs },
}

impl RelayCommand {
    /// The snippet to execute in the embedded engine
    pub fn render(&self, abi: &RelayAbi) -> Result<String, ScriptExecutionError> {
        check_dotted_name("relay server module", &abi.server_module)?;

        let mut code = String::new();
        if matches!(
            self,
            RelayCommand::CallService {
                args: RemoteArgs::Json(_),
                ..
            }
        ) {
            code.push_str("import json\n");
        }
        let _ = writeln!(code, "import {} as relay_server", abi.server_module);

        let call = match self {
            RelayCommand::Start { client_init } => {
                let init = client_init
                    .as_deref()
                    .map_or_else(|| "None".to_string(), |p| py_str_literal(&forward_slashes(p)));
                format!("relay_server.start({})", init)
            }
            RelayCommand::Stop { terminate_worker } => format!(
                "relay_server.stop({})",
                if *terminate_worker { "True" } else { "False" }
            ),
            RelayCommand::RunCode { code } => {
                format!("relay_server.run_python_code_on_client({})", py_str_literal(code))
            }
            RelayCommand::RunFile { path } => format!(
                "relay_server.run_python_file_on_client({})",
                py_str_literal(&forward_slashes(path))
            ),
            RelayCommand::CallService { name, args } => {
                check_dotted_name("remote operation", name)?;
                format!(
                    "relay_server.call_remote_service({}, {})",
                    py_str_literal(name),
                    args.render()?
                )
            }
        };
        code.push_str(&call);
        code.push('\n');
        Ok(code)
    }
}

/// Quote `s` as a Python string literal
pub fn py_str_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Path display with `/` separators, as the worker expects
pub fn forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn check_dotted_name(what: &str, name: &str) -> Result<(), ScriptExecutionError> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c == '_' || c.is_alphabetic())
                && chars.all(|c| c == '_' || c.is_alphanumeric())
        });
    if valid {
        Ok(())
    } else {
        Err(ScriptExecutionError::without_trace(format!(
            "Invalid {} name '{}'",
            what, name
        )))
    }
}
