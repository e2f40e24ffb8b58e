//! `pyrelay validate`: classify a worker interpreter without starting anything

use crate::logger;
use crate::GlobalOpts;
use clap::Args;
use colored::*;

#[derive(Args, Debug, Clone)]
pub struct ValidateCommand {
    /// Interpreter to check instead of the configured one (not saved)
    pub interpreter: Option<String>,

    /// Override validation-timeout-ms from the settings
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,
}

pub fn handle_validate(cmd: ValidateCommand, opts: &GlobalOpts) -> anyhow::Result<()> {
    let mut session = opts.open_session()?;
    let required = session.options().required_version.clone();

    session.settings().update(|config| {
        if let Some(interpreter) = cmd.interpreter {
            config.interpreter_path = interpreter;
        }
        if let Some(ms) = cmd.timeout_ms.filter(|ms| *ms > 0) {
            config.validation_timeout_ms = ms;
        }
    });
    let timeout = session.settings().get().validation_timeout();

    logger::spinner_start("Checking worker interpreter");
    let result = session.validate_configured_interpreter();
    logger::spinner_stop();

    if let Some(err) = result.install_error(&required, timeout) {
        return Err(err.into());
    }
    println!(
        "{} {} ({})",
        "valid".green().bold(),
        result.resolved_path.display(),
        result.short_version()
    );
    Ok(())
}
