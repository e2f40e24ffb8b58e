use clap::{Parser, Subcommand};
use pyrelay::{
    commands::{
        config::{self, ConfigAction},
        run::{self, EnsureCommand, RunCommand},
        shell,
        validate::{self, ValidateCommand},
        worker::{self, WorkerCommand},
    },
    common, logger, GlobalOpts,
};

#[derive(Parser)]
#[command(name = "pyrelay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Host bridge to Python",
    long_about = "pyrelay runs Python in an embedded interpreter and on a supervised worker interpreter, and relays named calls to the worker."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change the worker settings
    #[command(subcommand_required = false, arg_required_else_help = false)]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// Check that a worker interpreter is usable
    Validate(ValidateCommand),
    /// Initialize the embedded interpreter (and the worker with --worker)
    Ensure(EnsureCommand),
    /// Run code or a file in the embedded interpreter
    Run(RunCommand),
    /// Run code or call an operation on the worker interpreter
    Worker(WorkerCommand),
    /// Keep a session open and read commands from stdin
    Shell,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logger::init_with_verbosity(cli.global.verbosity_level(), cli.global.log_python)
    {
        eprintln!("Warning: Failed to initialize logger: {}", e);
    }
    common::init_tracing(cli.global.verbosity_level());

    let result = match cli.command {
        Commands::Config { action } => config::handle_config(action, &cli.global),
        Commands::Validate(cmd) => validate::handle_validate(cmd, &cli.global),
        Commands::Ensure(cmd) => run::handle_ensure(cmd, &cli.global),
        Commands::Run(cmd) => run::handle_run(cmd, &cli.global),
        Commands::Worker(cmd) => worker::handle_worker(cmd, &cli.global),
        Commands::Shell => shell::handle_shell(&cli.global),
    };

    if let Err(e) = result {
        logger::error(&format!("{:#}", e));
        if cli.global.verbosity_level() > 0 {
            logger::show_log_path();
        }
        std::process::exit(1);
    }
}
