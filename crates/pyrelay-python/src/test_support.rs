//! Test doubles: a scripted engine and fake interpreter executables

use crate::engine::{AttrValue, Engine};
use crate::errors::{InstallError, ScriptExecutionError};
use crate::search_path::locate_module;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const SCRIPTED_DEFAULT_PATH: &str = "/usr/lib/python3.12";

/// In-memory [`Engine`] that records what it is asked to do
///
/// The execution log is shared so it can be inspected after the owning
/// session has been dropped.
#[derive(Debug)]
pub struct ScriptedEngine {
    pub version: String,
    pub installed_path: Vec<String>,
    pub available_modules: Vec<String>,
    pub attrs: HashMap<String, AttrValue>,
    pub initialize_calls: usize,
    fail_when: Option<String>,
    log: Rc<RefCell<Vec<String>>>,
}

impl ScriptedEngine {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            installed_path: Vec::new(),
            available_modules: Vec::new(),
            attrs: HashMap::new(),
            initialize_calls: 0,
            fail_when: None,
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Make `module` importable regardless of the search path
    pub fn with_module(mut self, module: &str) -> Self {
        self.available_modules.push(module.to_string());
        self
    }

    /// Raise on any payload containing `needle`
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_when = Some(needle.to_string());
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn shared_log(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.log)
    }
}

impl Engine for ScriptedEngine {
    fn initialize(&mut self) -> Result<(), InstallError> {
        self.initialize_calls += 1;
        Ok(())
    }

    fn version(&self) -> Result<String, InstallError> {
        Ok(self.version.clone())
    }

    fn default_search_path(&self) -> Result<Vec<String>, InstallError> {
        Ok(vec![SCRIPTED_DEFAULT_PATH.to_string()])
    }

    fn install_search_path(&mut self, paths: &[String]) -> Result<(), InstallError> {
        self.installed_path = paths.to_vec();
        Ok(())
    }

    fn can_import(&mut self, module: &str) -> bool {
        self.available_modules.iter().any(|m| m == module)
            || locate_module(&self.installed_path, module).is_some()
    }

    fn set_module_attr(
        &mut self,
        module: &str,
        name: &str,
        value: AttrValue,
    ) -> Result<(), ScriptExecutionError> {
        if !self.can_import(module) {
            return Err(ScriptExecutionError::new(
                format!("ModuleNotFoundError: No module named '{}'", module),
                "Traceback (most recent call last):\\n  File \"<string>\", line 1",
            ));
        }
        self.attrs.insert(format!("{}.{}", module, name), value);
        Ok(())
    }

    fn exec(&mut self, code: &str, _origin: Option<&Path>) -> Result<(), ScriptExecutionError> {
        self.log.borrow_mut().push(code.to_string());
        match &self.fail_when {
            Some(needle) if code.contains(needle.as_str()) => Err(ScriptExecutionError::new(
                format!("RuntimeError: {}", needle),
                "Traceback (most recent call last):\\n  File \"<string>\", line 1, in <module>",
            )),
            _ => Ok(()),
        }
    }
}

/// Write an executable shell script that logs its arguments to
/// `<dir>/<name>.calls` and then runs `body`
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let calls = dir.join(format!("{}.calls", name));
    let script = format!(
        "#!/bin/sh\necho \"$*\" >> '{}'\n{}\n",
        calls.display(),
        body
    );
    assert!(fs::write(&path, script).is_ok());
    assert!(fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).is_ok());
    path
}

/// A fake interpreter answering the version probe with `version` and
/// exiting with `other_exit` for anything else (the smoke test)
#[cfg(unix)]
pub fn fake_interpreter(dir: &Path, name: &str, version: &str, other_exit: i32) -> PathBuf {
    let body = format!(
        "if [ \"$2\" = \"import sys; print(sys.version)\" ]; then\n  echo '{}'\n  exit 0\nfi\nexit {}",
        version, other_exit
    );
    write_script(dir, name, &body)
}

/// How many times the script `name` in `dir` has been run
pub fn call_count(dir: &Path, name: &str) -> usize {
    fs::read_to_string(dir.join(format!("{}.calls", name)))
        .map(|calls| calls.lines().count())
        .unwrap_or(0)
}

/// Arguments of each recorded run of `name`
pub fn calls(dir: &Path, name: &str) -> Vec<String> {
    fs::read_to_string(dir.join(format!("{}.calls", name)))
        .map(|calls| calls.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Wait up to two seconds for `pid` to stop running
///
/// A killed orphan may linger as a zombie until its new parent reaps it;
/// that counts as gone.
#[cfg(target_os = "linux")]
pub fn process_gone(pid: &str) -> bool {
    let stat = PathBuf::from(format!("/proc/{}/stat", pid.trim()));
    for _ in 0..200 {
        match fs::read_to_string(&stat) {
            Err(_) => return true,
            Ok(line) => {
                let state = line.rsplit(')').next().and_then(|rest| rest.split_whitespace().next());
                if state == Some("Z") {
                    return true;
                }
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    false
}
