//! The embedded interpreter seam
//!
//! Everything the bridge needs from the interpreter living inside the host
//! process. [`crate::py_engine::PyEngine`] is the pyo3 implementation; tests
//! use a scripted stand-in.

use crate::errors::{InstallError, ScriptExecutionError};
use std::path::Path;

/// A value assigned to a module attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Str(String),
    StrList(Vec<String>),
}

pub trait Engine {
    /// Bring the interpreter up; called again after every failed attempt
    fn initialize(&mut self) -> Result<(), InstallError>;

    /// The interpreter's long version string, e.g. `3.12.1 (main, ...)`
    fn version(&self) -> Result<String, InstallError>;

    /// The module search path the interpreter started with
    fn default_search_path(&self) -> Result<Vec<String>, InstallError>;

    /// Replace the module search path, first entry wins
    fn install_search_path(&mut self, paths: &[String]) -> Result<(), InstallError>;

    /// Whether `module` can be imported with the current search path
    fn can_import(&mut self, module: &str) -> bool;

    fn set_module_attr(
        &mut self,
        module: &str,
        name: &str,
        value: AttrValue,
    ) -> Result<(), ScriptExecutionError>;

    /// Execute `code`; `origin` names the file it was read from, if any
    fn exec(&mut self, code: &str, origin: Option<&Path>) -> Result<(), ScriptExecutionError>;
}
