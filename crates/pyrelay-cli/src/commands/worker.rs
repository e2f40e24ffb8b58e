//! `pyrelay worker`: one-shot requests to a worker interpreter
//!
//! Each invocation starts the relay server, performs one request and stops
//! the worker again on exit. Use `pyrelay shell` to keep a worker running
//! across requests.

use super::shell::HostCommand;
use crate::logger;
use crate::GlobalOpts;
use anyhow::bail;
use clap::{Args, Subcommand};
use pyrelay_python::RemoteArgs;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct WorkerCommand {
    /// Initialization script the worker runs on startup
    /// (default: $PYRELAY_RESOURCE_PATH/scripts/client_init.py)
    #[arg(long, value_name = "FILE", conflicts_with = "bare")]
    pub init: Option<PathBuf>,

    /// Start the worker without an initialization script
    #[arg(long)]
    pub bare: bool,

    #[command(subcommand)]
    pub action: WorkerAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum WorkerAction {
    /// Validate and smoke-test the worker interpreter without starting it
    Check,
    /// Run code on the worker
    Run {
        #[arg(conflicts_with = "file")]
        code: Option<String>,
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Call a named remote operation on the worker
    Call {
        name: String,
        /// Arguments: a Python expression, or JSON with --json
        args: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

impl WorkerCommand {
    /// The host commands this invocation stands for, in order
    pub fn plan(&self) -> anyhow::Result<Vec<HostCommand>> {
        let request = match &self.action {
            WorkerAction::Check => return Ok(vec![HostCommand::EnsureWorker]),
            WorkerAction::Run {
                file: Some(file), ..
            } => HostCommand::WorkerRunFile(file.clone()),
            WorkerAction::Run {
                code: Some(code), ..
            } => HostCommand::WorkerRun(code.clone()),
            WorkerAction::Run { .. } => bail!("Nothing to run: pass inline code or --file"),
            WorkerAction::Call { name, args, json } => {
                let args = match args.as_deref().map(str::trim) {
                    None | Some("") => RemoteArgs::None,
                    Some(raw) if *json => RemoteArgs::Json(serde_json::from_str(raw)?),
                    Some(raw) => RemoteArgs::Python(raw.to_string()),
                };
                HostCommand::Call {
                    name: name.clone(),
                    args,
                }
            }
        };

        let start = match (&self.init, self.bare) {
            (Some(init), _) => HostCommand::Start(Some(init.clone())),
            (None, true) => HostCommand::Start(None),
            (None, false) => HostCommand::StartDefault,
        };
        Ok(vec![start, request])
    }
}

pub fn handle_worker(cmd: WorkerCommand, opts: &GlobalOpts) -> anyhow::Result<()> {
    let plan = cmd.plan()?;
    let mut session = opts.open_session()?;

    for command in &plan {
        logger::debug(&format!("worker: {:?}", command));
        command.execute(&mut session)?;
    }
    if matches!(cmd.action, WorkerAction::Check) {
        logger::success("Worker interpreter is ready");
    }
    Ok(())
}
