//! Worker pools and the results they collect.
//!
//! Two pools implement [`WorkerPool`]:
//! - [`threads::ThreadPool`] — readers as threads of this process
//! - [`processes::ProcessPool`] — isolated worker processes, each running threads
//!
//! Both block until every worker of the group has finished and report one
//! [`GroupResult`], so the orchestrator treats them the same way.

pub mod processes;
pub mod threads;

use crate::worker::{throughput, WorkerResult, WorkerSpec};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One concurrency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    /// `None`: readers are threads of this process. `Some(p)`: `p` isolated
    /// processes, each with `threads` readers.
    pub processes: Option<usize>,
    pub threads: usize,
}

impl Level {
    pub fn threads(threads: usize) -> Self {
        Self {
            processes: None,
            threads,
        }
    }

    pub fn grid(processes: usize, threads: usize) -> Self {
        Self {
            processes: Some(processes),
            threads,
        }
    }

    /// Total readers at this level.
    pub fn workers(&self) -> usize {
        self.processes.unwrap_or(1) * self.threads
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.processes {
            None => write!(f, "{} threads", self.threads),
            Some(p) => write!(f, "{} processes x {} threads", p, self.threads),
        }
    }
}

/// Everything a pool needs to run one level.
#[derive(Debug, Clone)]
pub struct GroupJob {
    pub workload: WorkerSpec,
    pub level: Level,
    pub pin_cpus: bool,
}

/// Results of one memory-sharing set of workers (one process).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResult {
    pub unit: usize,
    pub pid: u32,
    /// CPU the unit was pinned to, if pinning was requested and succeeded.
    pub cpu: Option<usize>,
    pub workers: Vec<WorkerResult>,
    /// From just before the first thread started to after the last joined.
    pub wall: Duration,
}

impl UnitResult {
    pub fn total_queries(&self) -> u64 {
        self.workers.iter().map(|w| w.queries).sum()
    }

    /// Wall-clock throughput of the unit; never the sum of worker rates.
    pub fn qps(&self) -> f64 {
        throughput(self.total_queries(), self.wall)
    }
}

/// Results of one concurrency level, available only after every worker joined.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupResult {
    pub level: Level,
    pub units: Vec<UnitResult>,
    pub wall: Duration,
}

impl GroupResult {
    pub fn total_queries(&self) -> u64 {
        self.units.iter().map(UnitResult::total_queries).sum()
    }

    /// Queries over the group's wall time.
    pub fn qps(&self) -> f64 {
        throughput(self.total_queries(), self.wall)
    }

    pub fn worker_results(&self) -> impl Iterator<Item = &WorkerResult> + '_ {
        self.units.iter().flat_map(|u| u.workers.iter())
    }

    pub fn worker_qps(&self) -> Vec<f64> {
        self.worker_results().map(WorkerResult::qps).collect()
    }

    /// Mean time per query as measured inside the workers.
    pub fn mean_latency(&self) -> Option<Duration> {
        let queries = self.total_queries();
        if queries == 0 {
            return None;
        }
        let busy: f64 = self
            .worker_results()
            .map(|w| w.elapsed.as_secs_f64())
            .sum();
        Some(Duration::from_secs_f64(busy / queries as f64))
    }
}

/// Runs one concurrency level to completion.
///
/// Implementations start the group timer immediately before launching the
/// first worker and stop it once the last one has finished. A failure of any
/// worker fails the whole group; no partial results are returned.
pub trait WorkerPool {
    fn run_group(&self, job: &GroupJob) -> Result<GroupResult>;
}
