// src/main.rs

use std::process::ExitCode;

use dagrun::cli::{self, CliArgs};
use dagrun::exec::{ActionRegistry, worker};
use dagrun::logging::{self, LogRole};
use dagrun::{exit_code_for, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    if args.worker {
        return run_worker(&args).await;
    }

    if let Err(err) = logging::init_logging(args.log_level, LogRole::Coordinator) {
        eprintln!("dagrun error: {err:?}");
    }

    match run(args).await {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(err) => {
            eprintln!("dagrun error: {err:?}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

async fn run_worker(args: &CliArgs) -> ExitCode {
    if let Err(err) = logging::init_logging(args.log_level, LogRole::Worker) {
        eprintln!("dagrun worker error: {err:?}");
    }

    match worker::serve(ActionRegistry::with_builtins()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("dagrun worker error: {err}");
            ExitCode::FAILURE
        }
    }
}
