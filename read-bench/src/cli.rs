//! Command-line surface.
//!
//! Every flag has a default, and most can also come from a `READBENCH_*`
//! environment variable (a `.env` file in the working directory is loaded
//! first).

use crate::config::BenchConfig;
use crate::dataset::{DatasetSpec, JournalMode};
use crate::pool::processes::UnitRequest;
use crate::pool::Level;
use crate::worker::{QueryShape, WorkerSpec};
use bench_core::constants::{
    DEFAULT_BUCKET_RANGE, DEFAULT_DB_PATH, DEFAULT_QUERIES_PER_WORKER, DEFAULT_RESULTS_PATH,
    DEFAULT_ROWS, DEFAULT_THREADS_PER_PROCESS, DEFAULT_THREAD_LEVELS,
};
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(
    name = "read-bench",
    version,
    about = "SQLite3 concurrent read performance benchmark"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Log level for stderr (and the log file, if any)
    #[arg(
        long,
        global = true,
        env = "READBENCH_LOG_LEVEL",
        default_value = "info"
    )]
    pub log_level: LevelFilter,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one isolated unit and print its result as JSON (used internally)
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to SQLite file (will be overwritten)
    #[arg(long, env = "READBENCH_DB_PATH", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    /// Number of rows to insert
    #[arg(long, env = "READBENCH_ROWS", default_value_t = DEFAULT_ROWS)]
    pub rows: u64,

    /// Random x range: [0, x_range)
    #[arg(
        long = "x-range",
        alias = "bucket-range",
        env = "READBENCH_X_RANGE",
        default_value_t = DEFAULT_BUCKET_RANGE
    )]
    pub x_range: u32,

    /// Thread counts to test one after another, e.g. 1,2,4
    #[arg(
        long,
        env = "READBENCH_THREADS",
        value_delimiter = ',',
        default_values_t = DEFAULT_THREAD_LEVELS.to_vec()
    )]
    pub threads: Vec<usize>,

    /// Worker process counts; when given, each level is processes x threads-per-proc
    #[arg(long, env = "READBENCH_PROCESSES", value_delimiter = ',')]
    pub processes: Vec<usize>,

    /// Number of threads per process
    #[arg(
        long,
        env = "READBENCH_THREADS_PER_PROC",
        default_value_t = DEFAULT_THREADS_PER_PROCESS
    )]
    pub threads_per_proc: usize,

    /// Queries each thread will execute
    #[arg(
        long,
        env = "READBENCH_QUERIES_PER_THREAD",
        default_value_t = DEFAULT_QUERIES_PER_WORKER
    )]
    pub queries_per_thread: u64,

    /// Read query issued by every worker
    #[arg(long, value_enum, default_value_t = QueryShape::Lookup)]
    pub shape: QueryShape,

    /// Journal mode of the generated database
    #[arg(long, value_enum, default_value_t = JournalMode::Wal)]
    pub journal_mode: JournalMode,

    /// Best-effort: pin each process (or thread) to a separate CPU
    #[arg(long)]
    pub pin_cpus: bool,

    /// Fixed seed for the dataset and the workers' bucket sequences
    #[arg(long, env = "READBENCH_SEED")]
    pub seed: Option<u64>,

    /// Results file the report is duplicated to
    #[arg(long, env = "READBENCH_OUTPUT", default_value = DEFAULT_RESULTS_PATH)]
    pub output: PathBuf,

    /// Only print to the console
    #[arg(long)]
    pub no_output: bool,

    /// Also append log records to this file
    #[arg(long, env = "READBENCH_LOG_FILE")]
    pub log_file: Option<String>,
}

impl RunArgs {
    pub fn levels(&self) -> Vec<Level> {
        if self.processes.is_empty() {
            self.threads.iter().map(|&t| Level::threads(t)).collect()
        } else {
            self.processes
                .iter()
                .map(|&p| Level::grid(p, self.threads_per_proc))
                .collect()
        }
    }

    pub fn to_config(&self) -> BenchConfig {
        let mut dataset = DatasetSpec::new(&self.db_path, self.rows, self.x_range);
        dataset.journal_mode = self.journal_mode;
        dataset.seed = self.seed;

        BenchConfig {
            dataset,
            levels: self.levels(),
            queries_per_worker: self.queries_per_thread,
            shape: self.shape,
            pin_cpus: self.pin_cpus,
            seed: self.seed,
        }
    }

    pub fn results_path(&self) -> Option<&Path> {
        if self.no_output {
            None
        } else {
            Some(&self.output)
        }
    }
}

#[derive(Debug, Args)]
pub struct WorkerArgs {
    #[arg(long)]
    pub db_path: PathBuf,

    #[arg(long = "x-range")]
    pub x_range: u32,

    #[arg(long)]
    pub threads: usize,

    #[arg(long)]
    pub queries_per_thread: u64,

    #[arg(long, value_enum)]
    pub shape: QueryShape,

    /// Index of this process within its level
    #[arg(long)]
    pub unit: usize,

    /// Pin this process before starting threads
    #[arg(long)]
    pub pin: bool,

    #[arg(long)]
    pub seed: Option<u64>,
}

impl WorkerArgs {
    pub fn to_request(&self) -> UnitRequest {
        UnitRequest {
            workload: WorkerSpec {
                db_path: self.db_path.clone(),
                bucket_range: self.x_range,
                queries: self.queries_per_thread,
                shape: self.shape,
                seed: self.seed,
            },
            threads: self.threads,
            unit: self.unit,
            pin: self.pin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn zero_arguments_uses_defaults() {
        let cli = Cli::try_parse_from(["read-bench"]).unwrap();
        assert!(cli.command.is_none());

        let config = cli.run.to_config();
        assert_eq!(config.dataset.path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.dataset.rows, DEFAULT_ROWS);
        assert_eq!(config.dataset.bucket_range, DEFAULT_BUCKET_RANGE);
        assert_eq!(config.levels.len(), DEFAULT_THREAD_LEVELS.len());
        assert_eq!(config.queries_per_worker, DEFAULT_QUERIES_PER_WORKER);
        assert_eq!(
            cli.run.results_path(),
            Some(Path::new(DEFAULT_RESULTS_PATH))
        );
        config.validate().unwrap();
    }

    #[test]
    fn thread_list_becomes_levels() {
        let cli = Cli::try_parse_from(["read-bench", "--threads", "1,2"]).unwrap();

        assert_eq!(
            cli.run.levels(),
            vec![Level::threads(1), Level::threads(2)]
        );
    }

    #[test]
    fn processes_switch_to_grid() {
        let cli = Cli::try_parse_from([
            "read-bench",
            "--processes",
            "2,4",
            "--threads-per-proc",
            "8",
            "--pin-cpus",
            "--no-output",
        ])
        .unwrap();

        assert_eq!(cli.run.levels(), vec![Level::grid(2, 8), Level::grid(4, 8)]);
        assert!(cli.run.to_config().pin_cpus);
        assert_eq!(cli.run.results_path(), None);
    }

    #[test]
    fn shape_and_journal_mode_parse() {
        let cli = Cli::try_parse_from([
            "read-bench",
            "--shape",
            "grouped",
            "--journal-mode",
            "delete",
            "--seed",
            "5",
        ])
        .unwrap();

        let config = cli.run.to_config();
        assert_eq!(config.shape, QueryShape::Grouped);
        assert_eq!(config.dataset.journal_mode, JournalMode::Delete);
        assert_eq!(config.seed, Some(5));
        assert_eq!(config.dataset.seed, Some(5));
    }

    #[test]
    fn worker_subcommand_parses() {
        let cli = Cli::try_parse_from([
            "read-bench",
            "worker",
            "--db-path",
            "db.sqlite3",
            "--x-range",
            "10",
            "--threads",
            "3",
            "--queries-per-thread",
            "7",
            "--shape",
            "lookup",
            "--unit",
            "1",
            "--pin",
        ])
        .unwrap();

        let Some(Command::Worker(args)) = cli.command else {
            panic!("expected worker subcommand");
        };
        let request = args.to_request();
        assert_eq!(request.threads, 3);
        assert_eq!(request.unit, 1);
        assert!(request.pin);
        assert_eq!(request.workload.queries, 7);
        assert_eq!(request.workload.bucket_range, 10);
    }

    #[test]
    fn unknown_shape_is_rejected() {
        assert!(Cli::try_parse_from(["read-bench", "--shape", "scan"]).is_err());
    }
}
