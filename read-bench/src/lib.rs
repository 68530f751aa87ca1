//! SQLite Concurrent Read Benchmark
//!
//! Measures read-query throughput of a single on-disk SQLite file while the
//! number of concurrent readers varies:
//! - **Threads**: several readers inside this process, one connection each
//! - **Processes**: several isolated worker processes, each running threads
//!
//! A run builds a fresh dataset once, then executes every concurrency level
//! in order and reports per-level and per-worker throughput.
//!
//! Run the benchmark: `cargo run --release -p read-bench -- --help`
//! Run tests: `cargo test`

pub mod affinity;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod orchestrator;
pub mod pool;
pub mod report;
pub mod worker;
