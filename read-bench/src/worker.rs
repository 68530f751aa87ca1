//! Query worker: one reader with its own connection, timing a fixed query loop.

use anyhow::{ensure, Context, Result};
use bench_core::constants::{BUSY_TIMEOUT_MS, GROUP_MODULUS, TABLE_NAME};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Which read query every iteration issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum QueryShape {
    /// All rows of one bucket.
    Lookup,
    /// Aggregate over every bucket at or above the sampled one.
    Grouped,
}

impl QueryShape {
    pub fn sql(&self) -> String {
        match self {
            QueryShape::Lookup => format!("SELECT a, b, c, d FROM {TABLE_NAME} WHERE x = ?1"),
            QueryShape::Grouped => format!(
                "SELECT MAX(id), MAX(a) FROM {TABLE_NAME} WHERE x >= ?1 GROUP BY id % {GROUP_MODULUS}"
            ),
        }
    }
}

impl fmt::Display for QueryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryShape::Lookup => f.write_str("lookup"),
            QueryShape::Grouped => f.write_str("grouped"),
        }
    }
}

/// Position of a worker in the run: which isolated unit, which thread in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId {
    pub unit: usize,
    pub index: usize,
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.unit, self.index)
    }
}

/// The workload every worker of a group runs.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub db_path: PathBuf,
    pub bucket_range: u32,
    pub queries: u64,
    pub shape: QueryShape,
    /// Base seed; when `None` each worker seeds from the clock.
    pub seed: Option<u64>,
}

/// Timing published by one worker once its loop is done.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub worker: WorkerId,
    pub queries: u64,
    /// Rows walked across all queries.
    pub rows: u64,
    /// Wall time of the query loop only.
    pub elapsed: Duration,
}

impl WorkerResult {
    pub fn qps(&self) -> f64 {
        throughput(self.queries, self.elapsed)
    }

    /// Average time per query as seen by this worker.
    pub fn mean_latency(&self) -> Option<Duration> {
        if self.queries == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            self.elapsed.as_secs_f64() / self.queries as f64,
        ))
    }
}

/// Queries per second. Zero queries is 0; queries in zero time is infinite.
pub fn throughput(queries: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if queries == 0 {
        0.0
    } else if secs <= 0.0 {
        f64::INFINITY
    } else {
        queries as f64 / secs
    }
}

/// Open a private connection for reading.
///
/// The file must already exist; a missing dataset is an error rather than a
/// fresh empty database.
pub fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("opening reader on {}", path.display()))?;
    conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
    conn.pragma_update(None, "query_only", true)?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(conn)
}

/// Run `spec.queries` queries and time the loop.
///
/// Connection setup and teardown are outside the measured interval. The
/// first database error aborts the worker.
pub fn run_worker(spec: &WorkerSpec, id: WorkerId) -> Result<WorkerResult> {
    ensure!(spec.bucket_range > 0, "bucket range must be at least 1");

    let conn = open_reader(&spec.db_path)?;
    let mut stmt = conn
        .prepare(&spec.shape.sql())
        .with_context(|| format!("worker {id}: preparing {} query", spec.shape))?;
    let columns = stmt.column_count();
    let mut rng = StdRng::seed_from_u64(worker_seed(spec.seed, id));

    let mut rows_read = 0u64;
    let mut bytes_read = 0usize;

    let start = Instant::now();
    for _ in 0..spec.queries {
        let bucket = rng.gen_range(0..spec.bucket_range);
        let mut rows = stmt
            .query([bucket])
            .with_context(|| format!("worker {id}: query for bucket {bucket}"))?;
        // Touch every value so the engine materialises the full result.
        while let Some(row) = rows.next()? {
            for i in 0..columns {
                bytes_read += match row.get_ref(i)? {
                    ValueRef::Text(v) | ValueRef::Blob(v) => v.len(),
                    ValueRef::Null => 0,
                    ValueRef::Integer(_) | ValueRef::Real(_) => 8,
                };
            }
            rows_read += 1;
        }
    }
    let elapsed = start.elapsed();
    std::hint::black_box(bytes_read);

    drop(stmt);
    conn.close()
        .map_err(|(_, e)| e)
        .with_context(|| format!("worker {id}: closing connection"))?;

    log::debug!(
        "worker {id}: {} queries, {rows_read} rows in {:.4}s",
        spec.queries,
        elapsed.as_secs_f64()
    );

    Ok(WorkerResult {
        worker: id,
        queries: spec.queries,
        rows: rows_read,
        elapsed,
    })
}

/// Seed for one worker's random source.
///
/// Distinct worker ids always map to distinct seeds for the same base. Without
/// a base the clock and process id are mixed in, so workers in different
/// processes or runs do not replay each other's bucket sequence.
pub fn worker_seed(base: Option<u64>, id: WorkerId) -> u64 {
    let base = base.unwrap_or_else(process_base_seed);
    let identity = ((id.unit as u64 + 1) << 32) | id.index as u64;
    splitmix64(base.wrapping_add(identity.wrapping_mul(0x9E37_79B9_7F4A_7C15)))
}

/// Clock and pid mixed once per process, so every worker in the process
/// shares one base and distinct identities stay distinct.
fn process_base_seed() -> u64 {
    static BASE: OnceLock<u64> = OnceLock::new();
    *BASE.get_or_init(|| {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        nanos ^ (u64::from(std::process::id()) << 32)
    })
}

fn splitmix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{build, DatasetSpec};
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn spec_for(path: &Path, bucket_range: u32, queries: u64, shape: QueryShape) -> WorkerSpec {
        WorkerSpec {
            db_path: path.to_path_buf(),
            bucket_range,
            queries,
            shape,
            seed: Some(7),
        }
    }

    const ID: WorkerId = WorkerId { unit: 0, index: 0 };

    #[test]
    fn lookup_runs_configured_query_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("w.sqlite3");
        build(&DatasetSpec::new(&path, 2000, 1000)).unwrap();

        let result = run_worker(&spec_for(&path, 1000, 250, QueryShape::Lookup), ID).unwrap();

        assert_eq!(result.queries, 250);
        assert_eq!(result.worker, ID);
        assert!(result.elapsed > Duration::ZERO);
        assert!(result.qps() > 0.0);
    }

    #[test]
    fn single_bucket_lookup_reads_every_row_each_time() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("one.sqlite3");
        build(&DatasetSpec::new(&path, 120, 1)).unwrap();

        let result = run_worker(&spec_for(&path, 1, 10, QueryShape::Lookup), ID).unwrap();

        assert_eq!(result.rows, 10 * 120);
    }

    #[test]
    fn grouped_shape_materialises_groups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("g.sqlite3");
        build(&DatasetSpec::new(&path, 2000, 1)).unwrap();

        let result = run_worker(&spec_for(&path, 1, 5, QueryShape::Grouped), ID).unwrap();

        assert_eq!(result.queries, 5);
        assert_eq!(result.rows, 5 * u64::from(GROUP_MODULUS));
    }

    #[test]
    fn zero_queries_is_a_valid_empty_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("z.sqlite3");
        build(&DatasetSpec::new(&path, 10, 10)).unwrap();

        let result = run_worker(&spec_for(&path, 10, 0, QueryShape::Lookup), ID).unwrap();

        assert_eq!(result.queries, 0);
        assert_eq!(result.rows, 0);
        assert_eq!(result.qps(), 0.0);
        assert_eq!(result.mean_latency(), None);
    }

    #[test]
    fn missing_database_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.sqlite3");

        assert!(run_worker(&spec_for(&path, 10, 1, QueryShape::Lookup), ID).is_err());
    }

    #[test]
    fn missing_table_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bare.sqlite3");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE other (v INTEGER);")
            .unwrap();

        assert!(run_worker(&spec_for(&path, 10, 1, QueryShape::Lookup), ID).is_err());
    }

    #[test]
    fn reader_cannot_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.sqlite3");
        build(&DatasetSpec::new(&path, 10, 10)).unwrap();

        let conn = open_reader(&path).unwrap();
        let res = conn.execute(&format!("DELETE FROM {TABLE_NAME}"), []);
        assert!(res.is_err());
    }

    #[test]
    fn seeds_differ_per_worker() {
        let mut seen = HashSet::new();
        for unit in 0..4 {
            for index in 0..16 {
                assert!(seen.insert(worker_seed(Some(1), WorkerId { unit, index })));
            }
        }
    }

    #[test]
    fn clock_seeds_differ_per_worker_in_one_process() {
        let mut seen = HashSet::new();
        for unit in 0..4 {
            for index in 0..16 {
                assert!(seen.insert(worker_seed(None, WorkerId { unit, index })));
            }
        }
        let id = WorkerId { unit: 1, index: 2 };
        assert_eq!(worker_seed(None, id), worker_seed(None, id));
    }

    #[test]
    fn fixed_base_seed_is_reproducible() {
        let id = WorkerId { unit: 2, index: 3 };
        assert_eq!(worker_seed(Some(99), id), worker_seed(Some(99), id));
        assert_ne!(worker_seed(Some(99), id), worker_seed(Some(100), id));
    }

    #[test]
    fn throughput_edge_cases() {
        assert_eq!(throughput(0, Duration::ZERO), 0.0);
        assert!(throughput(5, Duration::ZERO).is_infinite());
        assert_eq!(throughput(200, Duration::from_secs(2)), 100.0);
    }
}
