//! Report module: human-readable benchmark output.
//!
//! Everything here formats values computed elsewhere. Output goes through
//! [`ReportSink`], which mirrors the console into a results file when one is
//! configured.

use crate::config::BenchConfig;
use crate::orchestrator::BenchmarkReport;
use crate::pool::GroupResult;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Stdout, optionally duplicated into a file.
pub struct ReportSink {
    console: io::Stdout,
    file: Option<BufWriter<File>>,
}

impl ReportSink {
    pub fn console() -> Self {
        Self {
            console: io::stdout(),
            file: None,
        }
    }

    /// Console plus `path` (truncated; parent directories are created).
    pub fn with_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating results directory {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("creating results file {}", path.display()))?;
        Ok(Self {
            console: io::stdout(),
            file: Some(BufWriter::new(file)),
        })
    }
}

impl Write for ReportSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.console.write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.console.flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

fn fmt_latency(latency: Option<Duration>) -> String {
    match latency {
        Some(d) => format!("{:.4} ms/query", d.as_secs_f64() * 1000.0),
        None => "n/a".to_string(),
    }
}

/// Run parameters, written before the first level starts.
pub fn write_header(
    out: &mut dyn Write,
    config: &BenchConfig,
    started: DateTime<Local>,
) -> io::Result<()> {
    let levels: Vec<String> = config.levels.iter().map(|l| l.to_string()).collect();

    writeln!(out, "{}", "=".repeat(80))?;
    writeln!(out, "  SQLite Concurrent Read Benchmark")?;
    writeln!(out, "  Started: {}", started.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "{}", "=".repeat(80))?;
    writeln!(out, "  Database:           {}", config.dataset.path.display())?;
    writeln!(
        out,
        "  Rows:               {} (x in [0,{}))",
        config.dataset.rows, config.dataset.bucket_range
    )?;
    writeln!(out, "  Journal mode:       {}", config.dataset.journal_mode)?;
    writeln!(out, "  Query shape:        {}", config.shape)?;
    writeln!(out, "  Queries per worker: {}", config.queries_per_worker)?;
    writeln!(out, "  Levels:             {}", levels.join(", "))?;
    writeln!(
        out,
        "  CPU pinning:        {}",
        if config.pin_cpus { "requested" } else { "off" }
    )?;
    Ok(())
}

/// One block per completed level.
pub fn write_group(out: &mut dyn Write, group: &GroupResult) -> io::Result<()> {
    writeln!(out, "\n--- Testing Concurrency: {} ---", group.level)?;
    writeln!(out, "  Workers:      {}", group.level.workers())?;
    writeln!(out, "  Wall time:    {:.4} s", group.wall.as_secs_f64())?;
    writeln!(out, "  Queries:      {}", group.total_queries())?;
    writeln!(out, "  Latency:      {}", fmt_latency(group.mean_latency()))?;
    writeln!(out, "  QPS:          {:.2}", group.qps())?;

    if group.level.processes.is_some() {
        writeln!(out, "\n  Per-process stats:")?;
        for unit in &group.units {
            let cpu = unit
                .cpu
                .map_or_else(|| "unpinned".to_string(), |c| format!("cpu {c}"));
            writeln!(
                out,
                "  Process {:<3} pid {:<8} {:<9} {:>9.4} s {:>10} queries {:>12.2} QPS",
                unit.unit,
                unit.pid,
                cpu,
                unit.wall.as_secs_f64(),
                unit.total_queries(),
                unit.qps()
            )?;
        }
    }

    writeln!(out, "\n  Per-worker stats:")?;
    writeln!(
        out,
        "  {:10} {:>10} {:>10} {:>12} {:>12} {:>14}",
        "Worker", "Queries", "Rows", "Elapsed (s)", "Latency (ms)", "QPS"
    )?;
    writeln!(out, "  {}", "-".repeat(73))?;
    for w in group.worker_results() {
        let latency = w
            .mean_latency()
            .map_or_else(|| "n/a".to_string(), |d| format!("{:.4}", d.as_secs_f64() * 1000.0));
        writeln!(
            out,
            "  {:10} {:>10} {:>10} {:>12.4} {:>12} {:>14.2}",
            w.worker.to_string(),
            w.queries,
            w.rows,
            w.elapsed.as_secs_f64(),
            latency,
            w.qps()
        )?;
    }
    Ok(())
}

/// Global figures across all levels.
pub fn write_summary(out: &mut dyn Write, report: &BenchmarkReport) -> io::Result<()> {
    writeln!(out, "\n{}", "=".repeat(80))?;

    if report.groups.len() >= 2 {
        writeln!(out, "\n  Comparison Summary:")?;
        writeln!(
            out,
            "  {:28} {:>8} {:>10} {:>10} {:>12}",
            "Level", "Workers", "Queries", "Wall (s)", "QPS"
        )?;
        writeln!(out, "  {}", "-".repeat(72))?;
        for g in &report.groups {
            writeln!(
                out,
                "  {:28} {:>8} {:>10} {:>10.4} {:>12.2}",
                g.level.to_string(),
                g.level.workers(),
                g.total_queries(),
                g.wall.as_secs_f64(),
                g.qps()
            )?;
        }
    }

    writeln!(out, "\n--- Per-worker QPS (all levels) ---")?;
    match report.worker_qps() {
        Some(stats) => {
            writeln!(out, "Workers total: {}", stats.count)?;
            writeln!(out, "Min QPS:    {:.2}", stats.min)?;
            writeln!(out, "Median QPS: {:.2}", stats.median)?;
            writeln!(out, "Mean QPS:   {:.2}", stats.mean)?;
            writeln!(out, "Max QPS:    {:.2}", stats.max)?;
            writeln!(out, "Std dev:    {:.2}", stats.std)?;
        }
        None => writeln!(out, "No workers ran.")?,
    }

    writeln!(out, "\n--- Global stats ---")?;
    writeln!(out, "Total queries:        {}", report.total_queries())?;
    writeln!(
        out,
        "Global wall time:     {:.4} s (excludes dataset setup)",
        report.wall.as_secs_f64()
    )?;
    writeln!(out, "Global effective QPS: {:.2}", report.qps())?;
    writeln!(out)?;
    Ok(())
}
