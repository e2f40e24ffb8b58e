//! Executable lookup for interpreter candidates
//!
//! A candidate is one of:
//! - empty: returned unchanged, callers treat it as "use the default interpreter"
//! - a path (contains `/` or `\`): made absolute against the base directory and
//!   accepted if it names an existing file, or a virtual environment directory
//! - a bare name: looked up in the extra search roots, then in `PATH`
//!
//! On Unix a leading `~` expands to `$HOME`. Windows has no such convention,
//! so the marker stays literal there.

use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Interpreter used when the configured path is empty
#[cfg(windows)]
pub const DEFAULT_INTERPRETER: &str = "python.exe";
#[cfg(not(windows))]
pub const DEFAULT_INTERPRETER: &str = "python3";

/// The name of the binaries/scripts directory in a Python venv
/// "Scripts" on Windows, "bin" on Unix
#[cfg(windows)]
pub const PYTHON_BIN_DIR: &str = "Scripts";
#[cfg(not(windows))]
pub const PYTHON_BIN_DIR: &str = "bin";

/// Candidate executable names in a venv
#[cfg(not(windows))]
const PYTHON_EXE_CANDIDATES: &[&str] = &["python3", "python"];
#[cfg(windows)]
const PYTHON_EXE_CANDIDATES: &[&str] = &["python.exe", "python3.exe"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("'{0}' was not found")]
    NotFound(String),
}

/// Resolves interpreter candidates to absolute executable paths
#[derive(Debug, Clone, Default)]
pub struct ExecutableResolver {
    base_dir: PathBuf,
    search_roots: Vec<PathBuf>,
}

impl ExecutableResolver {
    /// Resolver whose relative paths are interpreted against `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            search_roots: Vec::new(),
        }
    }

    /// Resolver rooted at the process working directory
    pub fn from_current_dir() -> Self {
        Self::new(env::current_dir().unwrap_or_default())
    }

    /// Add a directory searched for bare names before `PATH`
    ///
    /// Hosts with a project-relative asset tree register it here.
    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_roots.push(root.into());
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve `candidate` to an executable path
    pub fn resolve(&self, candidate: &str) -> Result<PathBuf, ResolveError> {
        if candidate.is_empty() {
            return Ok(PathBuf::new());
        }

        let expanded = expand_home(candidate);

        if expanded.contains(['/', '\\']) {
            let path = self.absolutize(Path::new(&expanded));
            if path.is_file() {
                return Ok(path);
            }
            if path.is_dir() {
                if let Some(exe) = venv_interpreter(&path) {
                    return Ok(exe);
                }
            }
            return Err(ResolveError::NotFound(candidate.to_string()));
        }

        for root in &self.search_roots {
            let root = self.absolutize(root);
            if let Ok(found) = which::which_in(&expanded, Some(&root), &self.base_dir) {
                return Ok(found);
            }
        }

        which::which(&expanded).map_err(|_| ResolveError::NotFound(candidate.to_string()))
    }

    /// Make `path` absolute against the base directory, dropping `.` and
    /// folding `..` components
    pub fn absolutize(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other.as_os_str()),
            }
        }
        normalized
    }
}

#[cfg(not(windows))]
fn expand_home(candidate: &str) -> String {
    if let Some(rest) = candidate.strip_prefix('~') {
        if let Some(home) = env::var_os("HOME").filter(|h| !h.is_empty()) {
            let rest = rest.trim_start_matches('/');
            return PathBuf::from(home).join(rest).to_string_lossy().into_owned();
        }
    }
    candidate.to_string()
}

#[cfg(windows)]
fn expand_home(candidate: &str) -> String {
    candidate.to_string()
}

/// Locate the interpreter of a Python virtual environment
///
/// - **Unix/macOS**: `.venv/bin/python3` or `.venv/bin/python`
/// - **Windows**: `.venv/Scripts/python.exe`
pub fn venv_interpreter(venv_path: &Path) -> Option<PathBuf> {
    let bin_dir = venv_path.join(PYTHON_BIN_DIR);
    if !bin_dir.is_dir() {
        return None;
    }

    for exe in PYTHON_EXE_CANDIDATES {
        let candidate = bin_dir.join(exe);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    // Fallback: any python-like file in the bin directory
    fs::read_dir(&bin_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with("python"))
                && p.is_file()
        })
}
