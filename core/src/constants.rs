//! Default knobs for the read benchmark.
//!
//! Every command-line flag falls back to one of these, so the benchmark is
//! runnable with no arguments at all.

/// Database file the dataset is written to. Overwritten on every run.
pub const DEFAULT_DB_PATH: &str = "test_reads.sqlite3";

/// Rows inserted by the dataset builder.
pub const DEFAULT_ROWS: u64 = 2000;

/// Bucket (`x` column) values are drawn from `[0, DEFAULT_BUCKET_RANGE)`.
pub const DEFAULT_BUCKET_RANGE: u32 = 1000;

/// Thread counts tested one after another when no process grid is requested.
pub const DEFAULT_THREAD_LEVELS: &[usize] = &[1, 2, 4, 8, 16];

/// Threads started inside each isolated worker process.
pub const DEFAULT_THREADS_PER_PROCESS: usize = 16;

/// Queries each worker issues.
pub const DEFAULT_QUERIES_PER_WORKER: u64 = 2000;

/// Where the report is duplicated to unless disabled.
pub const DEFAULT_RESULTS_PATH: &str = "results/benchmark.txt";

/// The one table the dataset builder creates.
pub const TABLE_NAME: &str = "table1";

/// Modulus used by the grouped-aggregate query shape.
pub const GROUP_MODULUS: u32 = 500;

/// Per-connection busy timeout in milliseconds.
pub const BUSY_TIMEOUT_MS: u64 = 30_000;
