//! pyo3 implementation of [`Engine`]
//!
//! Every entry point runs inside `Python::attach`, which holds the GIL for
//! the duration of the call.

use crate::engine::{AttrValue, Engine};
use crate::errors::{InstallError, ScriptExecutionError};
use once_cell::sync::OnceCell;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList, PyModule};
use pyrelay_logger as logger;
use std::path::Path;

/// `sys.path` as the interpreter first reported it
///
/// The embedded interpreter lives for the whole process, so this is captured
/// once and survives engine resets that rewrite `sys.path`.
static DEFAULT_SYS_PATH: OnceCell<Vec<String>> = OnceCell::new();

/// Name given to payloads that were not read from a file
const INLINE_ORIGIN: &str = "<string>";

#[derive(Debug, Default)]
pub struct PyEngine {
    initialized: bool,
}

impl PyEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for PyEngine {
    fn initialize(&mut self) -> Result<(), InstallError> {
        if self.initialized {
            return Ok(());
        }

        let start = std::time::Instant::now();
        // Must be set before the interpreter reads its environment
        std::env::set_var("PYTHONDONTWRITEBYTECODE", "1");
        pyo3::Python::initialize();
        logger::debug(&format!(
            "pyo3::Python::initialize took: {:?}",
            start.elapsed()
        ));

        pyo3::Python::attach(|py| {
            let sys = PyModule::import(py, "sys")?;
            sys.setattr("dont_write_bytecode", true)?;
            let path: Vec<String> = sys.getattr("path")?.extract()?;
            let _ = DEFAULT_SYS_PATH.set(path);
            Ok::<(), PyErr>(())
        })?;

        self.initialized = true;
        Ok(())
    }

    fn version(&self) -> Result<String, InstallError> {
        pyo3::Python::attach(|py| {
            let sys = PyModule::import(py, "sys")?;
            let version: String = sys.getattr("version")?.extract()?;
            Ok(version)
        })
    }

    fn default_search_path(&self) -> Result<Vec<String>, InstallError> {
        DEFAULT_SYS_PATH.get().cloned().ok_or_else(|| {
            InstallError::EngineInitialization("interpreter has not been initialized".to_string())
        })
    }

    fn install_search_path(&mut self, paths: &[String]) -> Result<(), InstallError> {
        pyo3::Python::attach(|py| {
            let sys = PyModule::import(py, "sys")?;
            sys.setattr("path", PyList::new(py, paths)?)?;
            PyModule::import(py, "importlib")?.call_method0("invalidate_caches")?;
            Ok(())
        })
    }

    fn can_import(&mut self, module: &str) -> bool {
        pyo3::Python::attach(|py| {
            let found = PyModule::import(py, "importlib.util")
                .and_then(|util| util.call_method1("find_spec", (module,)))
                .map(|spec| !spec.is_none());
            match found {
                Ok(found) => found,
                Err(e) => {
                    logger::debug(&format!("find_spec({}) raised: {}", module, e));
                    false
                }
            }
        })
    }

    fn set_module_attr(
        &mut self,
        module: &str,
        name: &str,
        value: AttrValue,
    ) -> Result<(), ScriptExecutionError> {
        pyo3::Python::attach(|py| {
            let target = PyModule::import(py, module).map_err(|e| script_error(py, &e))?;
            let result = match value {
                AttrValue::Str(s) => target.setattr(name, s),
                AttrValue::StrList(items) => target.setattr(name, items),
            };
            result.map_err(|e| script_error(py, &e))
        })
    }

    fn exec(&mut self, code: &str, origin: Option<&Path>) -> Result<(), ScriptExecutionError> {
        pyo3::Python::attach(|py| {
            run_code(py, code, origin).map_err(|e| script_error(py, &e))
        })
    }
}

fn run_code(py: Python<'_>, code: &str, origin: Option<&Path>) -> PyResult<()> {
    let builtins = PyModule::import(py, "builtins")?;

    let (globals, filename) = match origin {
        // Files get a fresh namespace, as if run with `python file.py`
        Some(path) => {
            let filename = path.display().to_string();
            let globals = PyDict::new(py);
            globals.set_item("__builtins__", &builtins)?;
            globals.set_item("__name__", "__main__")?;
            globals.set_item("__file__", &filename)?;
            (globals, filename)
        }
        None => {
            let main = PyModule::import(py, "__main__")?;
            (main.dict(), INLINE_ORIGIN.to_string())
        }
    };

    let compiled = builtins.call_method1("compile", (code, filename, "exec"))?;
    builtins.call_method1("exec", (compiled, globals))?;
    Ok(())
}

fn script_error(py: Python<'_>, err: &PyErr) -> ScriptExecutionError {
    let trace = err
        .traceback(py)
        .and_then(|tb| tb.format().ok())
        .unwrap_or_default();
    ScriptExecutionError::new(err.to_string(), &trace)
}
