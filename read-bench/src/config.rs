//! Benchmark configuration, independent of how it was supplied.

use crate::dataset::DatasetSpec;
use crate::pool::{GroupJob, Level};
use crate::worker::{QueryShape, WorkerSpec};
use anyhow::{ensure, Result};
use bench_core::constants::{
    DEFAULT_BUCKET_RANGE, DEFAULT_DB_PATH, DEFAULT_QUERIES_PER_WORKER, DEFAULT_ROWS,
    DEFAULT_THREAD_LEVELS,
};

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub dataset: DatasetSpec,
    /// Executed in this order; the report keeps it.
    pub levels: Vec<Level>,
    pub queries_per_worker: u64,
    pub shape: QueryShape,
    pub pin_cpus: bool,
    /// Base seed for the workers' random sources.
    pub seed: Option<u64>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetSpec::new(DEFAULT_DB_PATH, DEFAULT_ROWS, DEFAULT_BUCKET_RANGE),
            levels: DEFAULT_THREAD_LEVELS
                .iter()
                .map(|&t| Level::threads(t))
                .collect(),
            queries_per_worker: DEFAULT_QUERIES_PER_WORKER,
            shape: QueryShape::Lookup,
            pin_cpus: false,
            seed: None,
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.dataset.bucket_range > 0,
            "bucket range must be at least 1"
        );
        ensure!(!self.levels.is_empty(), "no concurrency levels configured");
        for level in &self.levels {
            ensure!(level.threads > 0, "thread count must be at least 1 ({level})");
            if let Some(p) = level.processes {
                ensure!(p > 0, "process count must be at least 1 ({level})");
            }
        }
        Ok(())
    }

    /// True when any level runs in isolated worker processes.
    pub fn uses_processes(&self) -> bool {
        self.levels.iter().any(|l| l.processes.is_some())
    }

    pub fn workload(&self) -> WorkerSpec {
        WorkerSpec {
            db_path: self.dataset.path.clone(),
            bucket_range: self.dataset.bucket_range,
            queries: self.queries_per_worker,
            shape: self.shape,
            seed: self.seed,
        }
    }

    pub fn job(&self, level: Level) -> GroupJob {
        GroupJob {
            workload: self.workload(),
            level,
            pin_cpus: self.pin_cpus,
        }
    }
}
