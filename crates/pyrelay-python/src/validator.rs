//! Worker interpreter validation
//!
//! A candidate may be any program, so every way it can fail is reported
//! separately: missing, unable to run, hanging, or the wrong Python.

use crate::errors::InstallError;
use crate::process::run_with_deadline;
use pyrelay_config::ExecutableResolver;
use pyrelay_logger as logger;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

/// Arguments that make a Python interpreter print its version and exit
pub const VERSION_PROBE_ARGS: [&str; 2] = ["-c", "import sys; print(sys.version)"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    NotFound,
    NotExecutable,
    TimedOut,
    WrongVersion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// The name or path as configured
    pub candidate: String,
    /// Absolute path of the executable (empty when not found)
    pub resolved_path: PathBuf,
    /// Trimmed version output (empty unless the program ran successfully)
    pub version_string: String,
    pub outcome: ValidationOutcome,
    /// Spawn error or exit code, for diagnostics
    pub detail: Option<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.outcome == ValidationOutcome::Valid
    }

    /// `"2.7.16 |Anaconda, Inc.| (default, ...)"` becomes `"2.7.16"`
    pub fn short_version(&self) -> &str {
        short_version(&self.version_string)
    }

    /// The install error this result stands for, `None` when valid
    pub fn install_error(&self, required: &str, timeout: Duration) -> Option<InstallError> {
        let path = if self.resolved_path.as_os_str().is_empty() {
            self.candidate.clone()
        } else {
            self.resolved_path.display().to_string()
        };
        let detail = self.detail.clone().unwrap_or_default();

        match self.outcome {
            ValidationOutcome::Valid => None,
            ValidationOutcome::NotFound if self.candidate.is_empty() => {
                Some(InstallError::EmptyInterpreter)
            }
            ValidationOutcome::NotFound => Some(InstallError::InterpreterNotFound { path }),
            ValidationOutcome::NotExecutable => Some(InstallError::InterpreterNotExecutable {
                path,
                reason: detail,
            }),
            ValidationOutcome::TimedOut => Some(InstallError::InterpreterTimedOut {
                path,
                timeout_ms: timeout.as_millis() as u64,
            }),
            ValidationOutcome::WrongVersion => Some(InstallError::InterpreterWrongVersion {
                path,
                required: required.to_string(),
                found: self.version_string.clone(),
            }),
        }
    }
}

/// First whitespace-delimited token of a long version string
pub fn short_version(long_version: &str) -> &str {
    long_version.split_whitespace().next().unwrap_or("")
}

/// True if `reported` starts with `required` at a version component boundary
///
/// `"3.12.1"` matches `"3.12"` and `"3"`, but not `"3.1"`.
pub fn version_matches(reported: &str, required: &str) -> bool {
    reported
        .trim()
        .strip_prefix(required)
        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
}

/// Classifies interpreter candidates against a required version
#[derive(Debug, Clone)]
pub struct InterpreterValidator {
    resolver: ExecutableResolver,
    required_version: String,
}

impl InterpreterValidator {
    pub fn new(resolver: ExecutableResolver, required_version: impl Into<String>) -> Self {
        Self {
            resolver,
            required_version: required_version.into(),
        }
    }

    pub fn required_version(&self) -> &str {
        &self.required_version
    }

    pub fn resolver(&self) -> &ExecutableResolver {
        &self.resolver
    }

    /// Resolve, run and classify `candidate`, waiting at most `timeout`
    pub fn validate(&self, candidate: &str, timeout: Duration) -> ValidationResult {
        let mut result = ValidationResult {
            candidate: candidate.to_string(),
            resolved_path: PathBuf::new(),
            version_string: String::new(),
            outcome: ValidationOutcome::NotFound,
            detail: None,
        };

        if candidate.is_empty() {
            result.detail = Some("empty interpreter setting".to_string());
            return result;
        }

        let resolved = match self.resolver.resolve(candidate) {
            Ok(path) => path,
            Err(e) => {
                logger::debug(&format!("Interpreter lookup failed: {}", e));
                result.detail = Some(e.to_string());
                return result;
            }
        };
        result.resolved_path = resolved.clone();

        logger::debug(&format!(
            "Probing interpreter {} (timeout {:?})",
            resolved.display(),
            timeout
        ));
        let mut command = Command::new(&resolved);
        command.args(VERSION_PROBE_ARGS);

        let output = match run_with_deadline(command, timeout) {
            Ok(output) => output,
            Err(e) => {
                result.outcome = ValidationOutcome::NotExecutable;
                result.detail = Some(e.to_string());
                return result;
            }
        };

        if output.timed_out {
            logger::debug(&format!(
                "Killed {} (pid {}) after {:?}",
                resolved.display(),
                output.pid,
                timeout
            ));
            result.outcome = ValidationOutcome::TimedOut;
            return result;
        }

        logger::capture_output(
            &format!("{} {}", resolved.display(), VERSION_PROBE_ARGS.join(" ")),
            output.status.code(),
            &output.stdout,
            &output.stderr,
        );

        if !output.status.success() {
            result.outcome = ValidationOutcome::NotExecutable;
            result.detail = Some(match output.status.code() {
                Some(code) => format!("it failed with exit code {}", code),
                None => "it was terminated by a signal".to_string(),
            });
            return result;
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        result.version_string = version.clone();
        result.outcome = if version_matches(&version, &self.required_version) {
            ValidationOutcome::Valid
        } else {
            ValidationOutcome::WrongVersion
        };

        logger::debug(&format!(
            "Interpreter {} reports '{}': {:?}",
            resolved.display(),
            short_version(&version),
            result.outcome
        ));
        result
    }
}
