//! Benchmark runner: builds the dataset, runs every level, prints the report.
//!
//! Usage:
//!   cargo run --release -p read-bench
//!   cargo run --release -p read-bench -- --threads 1,2,4,8
//!   cargo run --release -p read-bench -- --processes 2 --threads-per-proc 16 --pin-cpus
//!
//! The hidden `worker` subcommand is what process levels re-execute.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use read_bench::cli::{Cli, Command, RunArgs, WorkerArgs};
use read_bench::orchestrator::Orchestrator;
use read_bench::pool::processes::serve_unit;
use read_bench::report::{self, ReportSink};
use std::io::{self, Write};
use std::{env, process};

fn main() {
    // A missing .env file is fine; flags and defaults still apply.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let log_file = match cli.command {
        None => cli.run.log_file.as_deref(),
        Some(_) => None,
    };
    bench_core::initialize_logger(cli.log_level, log_file).unwrap_or_else(|e| {
        eprintln!("Failed to initialize logger: {e:#}. Exiting.");
        process::exit(1);
    });

    let outcome = match &cli.command {
        Some(Command::Worker(args)) => run_worker_process(args),
        None => run_benchmark(&cli.run),
    };

    if let Err(e) = outcome {
        log::error!("{e:#}");
        process::exit(1);
    }
}

fn run_worker_process(args: &WorkerArgs) -> Result<()> {
    log::debug!(
        "Worker process {} (pid {}) starting {} threads",
        args.unit,
        process::id(),
        args.threads
    );
    let stdout = io::stdout();
    serve_unit(&args.to_request(), stdout.lock())
}

fn run_benchmark(args: &RunArgs) -> Result<()> {
    let started = Local::now();
    let results_path = args.results_path();

    let program = env::current_exe().context("locating own executable for worker processes")?;
    let orchestrator = Orchestrator::new(args.to_config()).with_worker_program(program);

    // The results file is only touched once setup has succeeded.
    let dataset = orchestrator.setup()?;

    let mut sink = match results_path {
        Some(path) => ReportSink::with_file(path)?,
        None => ReportSink::console(),
    };
    report::write_header(&mut sink, orchestrator.config(), started)?;

    let mut written: io::Result<()> = Ok(());
    let bench = orchestrator.run_levels(dataset, |group| {
        if written.is_ok() {
            written = report::write_group(&mut sink, group);
        }
    })?;
    written.context("writing report")?;

    report::write_summary(&mut sink, &bench)?;
    sink.flush()?;

    if let Some(path) = results_path {
        log::info!("Results written to {}", path.display());
    }
    Ok(())
}
