//! Orchestrator: builds the dataset once, then runs every level in order.

use crate::affinity;
use crate::config::BenchConfig;
use crate::dataset::{self, DatasetSummary};
use crate::pool::processes::ProcessPool;
use crate::pool::threads::ThreadPool;
use crate::pool::{GroupResult, WorkerPool};
use crate::worker::{throughput, WorkerResult};
use anyhow::{bail, Context, Result};
use bench_core::stats::Statistics;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Everything one run measured.
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub dataset: DatasetSummary,
    /// In the order the levels were configured.
    pub groups: Vec<GroupResult>,
    /// From the first level's start to the last level's end; dataset
    /// creation is excluded.
    pub wall: Duration,
}

impl BenchmarkReport {
    pub fn total_queries(&self) -> u64 {
        self.groups.iter().map(GroupResult::total_queries).sum()
    }

    pub fn qps(&self) -> f64 {
        throughput(self.total_queries(), self.wall)
    }

    /// Distribution of per-worker throughput across every level.
    pub fn worker_qps(&self) -> Option<Statistics> {
        let samples: Vec<f64> = self
            .groups
            .iter()
            .flat_map(|g| g.worker_results())
            .map(WorkerResult::qps)
            .collect();
        Statistics::from_samples(&samples)
    }
}

pub struct Orchestrator {
    config: BenchConfig,
    worker_program: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(config: BenchConfig) -> Self {
        Self {
            config,
            worker_program: None,
        }
    }

    /// Program started for process levels; it must understand the `worker`
    /// subcommand. Required as soon as any level uses processes.
    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn run(&self) -> Result<BenchmarkReport> {
        self.run_with(|_| {})
    }

    /// Run the whole benchmark, calling `on_group` after each level completes.
    pub fn run_with(&self, on_group: impl FnMut(&GroupResult)) -> Result<BenchmarkReport> {
        let dataset = self.setup()?;
        self.run_levels(dataset, on_group)
    }

    /// Validate the configuration and build the dataset.
    ///
    /// Nothing is measured yet; a failure here means no level has run.
    pub fn setup(&self) -> Result<DatasetSummary> {
        self.config.validate()?;
        if self.worker_program.is_none() && self.config.uses_processes() {
            bail!("process levels are configured but no worker program was given");
        }

        let spec = &self.config.dataset;
        log::info!(
            "Creating DB at {} with {} rows (x in [0,{}))",
            spec.path.display(),
            spec.rows,
            spec.bucket_range
        );
        let dataset = dataset::build(spec).context("building dataset")?;
        let rows = dataset::verify_rows(&dataset.path, spec.rows)?;
        log::info!(
            "Dataset ready in {:.3}s: {rows} rows ({} journal)",
            dataset.elapsed.as_secs_f64(),
            dataset.journal_mode
        );
        if self.config.pin_cpus {
            log::info!(
                "CPU pinning requested across {} cores",
                affinity::available_cores()
            );
        }
        Ok(dataset)
    }

    /// Run every level in order against a dataset built by [`Self::setup`].
    pub fn run_levels(
        &self,
        dataset: DatasetSummary,
        mut on_group: impl FnMut(&GroupResult),
    ) -> Result<BenchmarkReport> {
        let process_pool = match &self.worker_program {
            Some(program) => Some(ProcessPool::new(program.clone())),
            None if self.config.uses_processes() => {
                bail!("process levels are configured but no worker program was given")
            }
            None => None,
        };
        let thread_pool = ThreadPool;

        let mut groups = Vec::with_capacity(self.config.levels.len());
        let start = Instant::now();
        for &level in &self.config.levels {
            let pool: &dyn WorkerPool = match (level.processes, &process_pool) {
                (Some(_), Some(pool)) => pool,
                _ => &thread_pool,
            };

            log::info!("Running {level} ({} workers)", level.workers());
            let group = pool
                .run_group(&self.config.job(level))
                .with_context(|| format!("running {level}"))?;
            log::info!(
                "Finished {level}: {} queries in {:.4}s",
                group.total_queries(),
                group.wall.as_secs_f64()
            );

            on_group(&group);
            groups.push(group);
        }
        let wall = start.elapsed();

        Ok(BenchmarkReport {
            dataset,
            groups,
            wall,
        })
    }
}
