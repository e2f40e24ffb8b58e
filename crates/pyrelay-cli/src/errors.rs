//! Errors raised by the CLI itself, before anything reaches the bridge

use thiserror::Error;

/// Errors from parsing a host shell line
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Unknown command '{0}'. Type 'help' for the list of commands")]
    UnknownCommand(String),

    #[error("'{command}' needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("Invalid JSON arguments: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_argument_display() {
        let err = ShellError::MissingArgument {
            command: "run-file",
            argument: "a file path",
        };
        assert_eq!(err.to_string(), "'run-file' needs a file path");
    }
}
