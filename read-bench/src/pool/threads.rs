//! Lightweight pool: readers are threads sharing this process.

use super::{GroupJob, GroupResult, UnitResult, WorkerPool};
use crate::affinity;
use crate::worker::{run_worker, WorkerId, WorkerResult, WorkerSpec};
use anyhow::{anyhow, ensure, Context, Result};
use std::thread;
use std::time::Instant;

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPool;

impl ThreadPool {
    /// Run `threads` readers as unit `unit` and wait for all of them.
    ///
    /// Every thread opens its own connection. With `pin_threads` each thread
    /// pins itself to a different core before connecting.
    pub fn run_unit(
        &self,
        workload: &WorkerSpec,
        threads: usize,
        unit: usize,
        pin_threads: bool,
    ) -> Result<UnitResult> {
        ensure!(threads > 0, "a unit needs at least one thread");

        let start = Instant::now();
        let workers = thread::scope(|scope| -> Result<Vec<WorkerResult>> {
            let mut handles = Vec::with_capacity(threads);
            for index in 0..threads {
                let id = WorkerId { unit, index };
                let handle = thread::Builder::new()
                    .name(format!("reader-{id}"))
                    .spawn_scoped(scope, move || {
                        if pin_threads {
                            affinity::pin_current(index);
                        }
                        run_worker(workload, id)
                    })
                    .with_context(|| format!("spawning worker {id}"))?;
                handles.push(handle);
            }

            // Join everything first so no result escapes before the barrier.
            let joined: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
            joined
                .into_iter()
                .enumerate()
                .map(|(index, outcome)| {
                    outcome.unwrap_or_else(|_| Err(anyhow!("worker {unit}.{index} panicked")))
                })
                .collect()
        })?;
        let wall = start.elapsed();

        Ok(UnitResult {
            unit,
            pid: std::process::id(),
            cpu: None,
            workers,
            wall,
        })
    }
}

impl WorkerPool for ThreadPool {
    /// Runs every reader of the level as a thread of this process.
    fn run_group(&self, job: &GroupJob) -> Result<GroupResult> {
        let start = Instant::now();
        let unit = self.run_unit(&job.workload, job.level.workers(), 0, job.pin_cpus)?;
        let wall = start.elapsed();

        Ok(GroupResult {
            level: job.level,
            units: vec![unit],
            wall,
        })
    }
}
