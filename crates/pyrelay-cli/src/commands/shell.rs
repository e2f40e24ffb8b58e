//! `pyrelay shell`: a line-oriented stand-in for a host application
//!
//! One session lives for the whole shell, so the embedded interpreter and
//! the worker stay up between commands the way they would inside a real
//! host. Leaving the shell is the host-exit path.

use crate::errors::ShellError;
use crate::logger;
use crate::GlobalOpts;
use colored::*;
use pyrelay_python::{BridgeError, Engine, RemoteArgs, Session};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

const HELP: &str = "\
Commands:
  ensure                      initialize the embedded interpreter
  ensure-worker               initialize the worker interpreter too
  run CODE                    run CODE in-process
  run-file PATH               run a file in-process
  start [PATH | --default]    start the relay server (PATH: worker init script)
  stop [--terminate]          stop the relay server (and the worker)
  worker-run CODE             run CODE on the worker
  worker-run-file PATH        run a file on the worker
  call NAME [ARGS]            call a remote operation; ARGS is a Python expression
  call-json NAME JSON         call a remote operation with JSON arguments
  reinit [PATH]               terminate the worker and start it again
  status                      show the state of both interpreters
  help                        show this list
  quit                        stop the worker and leave";

/// One request from the host to the bridge
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Ensure,
    EnsureWorker,
    Run(String),
    RunFile(PathBuf),
    Start(Option<PathBuf>),
    StartDefault,
    Stop { terminate_worker: bool },
    WorkerRun(String),
    WorkerRunFile(PathBuf),
    Call { name: String, args: RemoteArgs },
    Reinit(Option<PathBuf>),
    Status,
    Help,
    Quit,
}

impl HostCommand {
    /// Parse a shell line; blank lines and `#` comments yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>, ShellError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let optional_path = || (!rest.is_empty()).then(|| PathBuf::from(rest));

        let command = match word {
            "ensure" => HostCommand::Ensure,
            "ensure-worker" => HostCommand::EnsureWorker,
            "run" => HostCommand::Run(required(rest, "run", "some code")?.to_string()),
            "run-file" => HostCommand::RunFile(required(rest, "run-file", "a file path")?.into()),
            "start" if rest == "--default" => HostCommand::StartDefault,
            "start" => HostCommand::Start(optional_path()),
            "stop" => HostCommand::Stop {
                terminate_worker: rest == "--terminate",
            },
            "worker-run" => {
                HostCommand::WorkerRun(required(rest, "worker-run", "some code")?.to_string())
            }
            "worker-run-file" => HostCommand::WorkerRunFile(
                required(rest, "worker-run-file", "a file path")?.into(),
            ),
            "call" | "call-json" => {
                let rest = required(rest, "call", "an operation name")?;
                let (name, args) = match rest.split_once(char::is_whitespace) {
                    Some((name, args)) => (name, args.trim()),
                    None => (rest, ""),
                };
                let args = if args.is_empty() {
                    RemoteArgs::None
                } else if word == "call-json" {
                    RemoteArgs::Json(serde_json::from_str(args)?)
                } else {
                    RemoteArgs::Python(args.to_string())
                };
                HostCommand::Call {
                    name: name.to_string(),
                    args,
                }
            }
            "reinit" => HostCommand::Reinit(optional_path()),
            "status" => HostCommand::Status,
            "help" | "?" => HostCommand::Help,
            "quit" | "exit" => HostCommand::Quit,
            other => return Err(ShellError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }

    /// Execute against `session`
    pub fn execute<E: Engine>(&self, session: &mut Session<E>) -> Result<(), BridgeError> {
        match self {
            HostCommand::Ensure => session.ensure_in_process_ready(),
            HostCommand::EnsureWorker => session.ensure_out_of_process_ready(),
            HostCommand::Run(code) => session.run_string(code),
            HostCommand::RunFile(path) => session.run_file(path),
            HostCommand::Start(init) => session.start(init.as_deref()),
            HostCommand::StartDefault => session.start_with_default_init(),
            HostCommand::Stop { terminate_worker } => session.stop(*terminate_worker),
            HostCommand::WorkerRun(code) => session.run_on_worker(code),
            HostCommand::WorkerRunFile(path) => session.run_file_on_worker(path),
            HostCommand::Call { name, args } => session.call_remote_operation(name, args),
            HostCommand::Reinit(init) => session.reinitialize(init.as_deref()),
            HostCommand::Status => {
                print_status(session);
                Ok(())
            }
            HostCommand::Help => {
                println!("{}", HELP);
                Ok(())
            }
            HostCommand::Quit => {
                session.host_exit();
                Ok(())
            }
        }
    }
}

fn required<'a>(
    rest: &'a str,
    command: &'static str,
    argument: &'static str,
) -> Result<&'a str, ShellError> {
    if rest.is_empty() {
        Err(ShellError::MissingArgument { command, argument })
    } else {
        Ok(rest)
    }
}

fn print_status<E: Engine>(session: &Session<E>) {
    println!("{} {}", "in-process:".cyan(), session.in_process_stage());
    println!("{} {}", "worker:".cyan(), session.out_of_process_stage());
    if let Some(handle) = session.worker() {
        println!(
            "{} generation {} since {} ({})",
            "relay:".cyan(),
            handle.generation,
            handle.started_at.format("%H:%M:%S"),
            handle.executable.display()
        );
    }
}

pub fn handle_shell(opts: &GlobalOpts) -> anyhow::Result<()> {
    let mut session = opts.open_session()?;
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    if interactive {
        println!("pyrelay shell. Type 'help' for commands.");
    }

    let mut failures = 0usize;
    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            print!("{}", "pyrelay> ".bold());
            let _ = io::stdout().flush();
        }
        let Some(line) = lines.next() else {
            break;
        };
        let command = match HostCommand::parse(&line?) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                logger::error(&e.to_string());
                failures += 1;
                continue;
            }
        };

        logger::debug(&format!("shell: {:?}", command));
        match command.execute(&mut session) {
            Ok(()) if command == HostCommand::Quit => break,
            Ok(()) => {}
            Err(e) => {
                logger::error(&e.to_string());
                failures += 1;
            }
        }
    }

    if failures > 0 && !interactive {
        anyhow::bail!("{} shell command(s) failed", failures);
    }
    Ok(())
}
