//! In-process commands: `pyrelay run` and `pyrelay ensure`

use crate::logger;
use crate::GlobalOpts;
use anyhow::bail;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct RunCommand {
    /// Python code to run in the embedded interpreter
    #[arg(conflicts_with = "file")]
    pub code: Option<String>,

    /// Run this file instead of inline code
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct EnsureCommand {
    /// Also validate and smoke-test the worker interpreter
    #[arg(long)]
    pub worker: bool,
}

pub fn handle_run(cmd: RunCommand, opts: &GlobalOpts) -> anyhow::Result<()> {
    let mut session = opts.open_session()?;
    match (cmd.code, cmd.file) {
        (_, Some(file)) => {
            logger::debug(&format!("Running {} in-process", file.display()));
            session.run_file(&file)?;
        }
        (Some(code), None) => session.run_string(&code)?,
        (None, None) => bail!("Nothing to run: pass inline code or --file"),
    }
    Ok(())
}

pub fn handle_ensure(cmd: EnsureCommand, opts: &GlobalOpts) -> anyhow::Result<()> {
    let mut session = opts.open_session()?;

    logger::spinner_start("Initializing embedded interpreter");
    let result = if cmd.worker {
        session.ensure_out_of_process_ready()
    } else {
        session.ensure_in_process_ready()
    };
    logger::spinner_stop();
    result?;

    logger::success("Embedded interpreter ready");
    for (i, entry) in session.search_path().iter().enumerate() {
        logger::info(&format!("  sys.path[{}] {}", i, entry));
    }
    if cmd.worker {
        let exe = session.settings().get().effective_interpreter().to_string();
        logger::success(&format!("Worker interpreter ready: {}", exe));
    }
    Ok(())
}
