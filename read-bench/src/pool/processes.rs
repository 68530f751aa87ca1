//! Isolated pool: every unit is a separate worker process.
//!
//! The parent re-executes a worker program (normally this binary's hidden
//! `worker` subcommand) once per unit. Each child runs its threads through
//! [`ThreadPool::run_unit`] and prints one JSON [`UnitResult`] on stdout.
//! Diagnostics go to the inherited stderr.

use super::threads::ThreadPool;
use super::{GroupJob, GroupResult, UnitResult, WorkerPool};
use crate::affinity;
use crate::worker::WorkerSpec;
use anyhow::{bail, ensure, Context, Result};
use log::LevelFilter;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct ProcessPool {
    program: PathBuf,
    log_level: LevelFilter,
}

impl ProcessPool {
    /// `program` must accept the `worker` subcommand.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            log_level: log::max_level(),
        }
    }

    /// Level the children log at; defaults to the parent's current maximum.
    pub fn with_log_level(mut self, log_level: LevelFilter) -> Self {
        self.log_level = log_level;
        self
    }

    fn command(&self, job: &GroupJob, unit: usize) -> Command {
        let workload = &job.workload;
        let mut cmd = Command::new(&self.program);
        cmd.arg("worker")
            .arg("--db-path")
            .arg(&workload.db_path)
            .arg("--x-range")
            .arg(workload.bucket_range.to_string())
            .arg("--threads")
            .arg(job.level.threads.to_string())
            .arg("--queries-per-thread")
            .arg(workload.queries.to_string())
            .arg("--shape")
            .arg(workload.shape.to_string())
            .arg("--unit")
            .arg(unit.to_string())
            .arg("--log-level")
            .arg(self.log_level.to_string());
        if job.pin_cpus {
            cmd.arg("--pin");
        }
        if let Some(seed) = workload.seed {
            cmd.arg("--seed").arg(seed.to_string());
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl WorkerPool for ProcessPool {
    fn run_group(&self, job: &GroupJob) -> Result<GroupResult> {
        let processes = job.level.processes.unwrap_or(1);
        ensure!(processes > 0, "a process level needs at least one process");
        ensure!(job.level.threads > 0, "a process needs at least one thread");

        let start = Instant::now();
        let mut children: Vec<Child> = Vec::with_capacity(processes);
        for unit in 0..processes {
            match self.command(job, unit).spawn() {
                Ok(child) => children.push(child),
                Err(e) => {
                    abandon(children);
                    return Err(e).with_context(|| {
                        format!(
                            "spawning worker process {unit} ({})",
                            self.program.display()
                        )
                    });
                }
            }
        }

        // Outer barrier: wait for every child before decoding any of them.
        let outputs: Vec<io::Result<Output>> = children
            .into_iter()
            .map(Child::wait_with_output)
            .collect();
        let wall = start.elapsed();

        let units = outputs
            .into_iter()
            .enumerate()
            .map(|(unit, output)| decode_unit(unit, output))
            .collect::<Result<Vec<_>>>()?;

        Ok(GroupResult {
            level: job.level,
            units,
            wall,
        })
    }
}

fn abandon(children: Vec<Child>) {
    for mut child in children {
        let _ = child.kill();
        let _ = child.wait();
    }
}

fn decode_unit(unit: usize, output: io::Result<Output>) -> Result<UnitResult> {
    let output = output.with_context(|| format!("waiting for worker process {unit}"))?;
    if !output.status.success() {
        bail!("worker process {unit} failed: {}", output.status);
    }
    let result: UnitResult = serde_json::from_slice(&output.stdout)
        .with_context(|| format!("decoding result of worker process {unit}"))?;
    ensure!(
        result.unit == unit,
        "worker process {unit} reported itself as unit {}",
        result.unit
    );
    Ok(result)
}

/// What a worker process is asked to do.
#[derive(Debug, Clone)]
pub struct UnitRequest {
    pub workload: WorkerSpec,
    pub threads: usize,
    pub unit: usize,
    pub pin: bool,
}

/// Child side of the protocol: pin (optionally), run the threads, and write
/// the unit's result as a single JSON line to `out`.
pub fn serve_unit(request: &UnitRequest, mut out: impl Write) -> Result<()> {
    // Pin before spawning threads so they inherit the mask.
    let cpu = if request.pin {
        affinity::pin_current(request.unit)
    } else {
        None
    };

    let mut result = ThreadPool.run_unit(&request.workload, request.threads, request.unit, false)?;
    result.cpu = cpu;

    serde_json::to_writer(&mut out, &result).context("encoding unit result")?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
