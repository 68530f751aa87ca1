//! Dataset builder: writes the synthetic table every run reads from.
//!
//! The target file is always destroyed first. Callers point the builder at a
//! scratch path; overwriting it is the expected behavior, not a failure.

use anyhow::{ensure, Context, Result};
use bench_core::constants::TABLE_NAME;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::{params, Connection};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Journal mode applied when the database is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum JournalMode {
    /// Write-ahead log; readers never block on the (absent) writer.
    Wal,
    /// Classic rollback journal.
    Delete,
}

impl JournalMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
        }
    }
}

impl fmt::Display for JournalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_pragma())
    }
}

/// What to build and where.
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    pub path: PathBuf,
    pub rows: u64,
    /// Bucket values are drawn from `[0, bucket_range)`. Must be at least 1.
    pub bucket_range: u32,
    pub journal_mode: JournalMode,
    /// Fixed seed for the bucket column; entropy-seeded when `None`.
    pub seed: Option<u64>,
}

impl DatasetSpec {
    pub fn new(path: impl Into<PathBuf>, rows: u64, bucket_range: u32) -> Self {
        Self {
            path: path.into(),
            rows,
            bucket_range,
            journal_mode: JournalMode::Wal,
            seed: None,
        }
    }
}

/// Outcome of a [`build`] call.
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub path: PathBuf,
    pub rows: u64,
    pub bucket_range: u32,
    pub journal_mode: JournalMode,
    pub elapsed: Duration,
}

/// Recreate the database at `spec.path` and fill it with `spec.rows` rows.
///
/// All inserts run in one transaction. The connection is closed before
/// returning, so the file is complete and ready for concurrent readers.
pub fn build(spec: &DatasetSpec) -> Result<DatasetSummary> {
    ensure!(spec.bucket_range > 0, "bucket range must be at least 1");

    let start = Instant::now();
    remove_existing(&spec.path)?;

    let mut conn = Connection::open(&spec.path)
        .with_context(|| format!("creating database {}", spec.path.display()))?;

    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", spec.journal_mode.as_pragma(), |row| {
            row.get(0)
        })
        .context("setting journal mode")?;
    log::debug!("journal_mode = {mode}");
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous mode")?;

    create_table(&conn)?;
    populate(&mut conn, spec)?;

    conn.close()
        .map_err(|(_, e)| e)
        .context("closing dataset connection")?;

    Ok(DatasetSummary {
        path: spec.path.clone(),
        rows: spec.rows,
        bucket_range: spec.bucket_range,
        journal_mode: spec.journal_mode,
        elapsed: start.elapsed(),
    })
}

/// Number of rows currently in the benchmark table.
pub fn count_rows(path: &Path) -> Result<u64> {
    let conn =
        Connection::open(path).with_context(|| format!("opening database {}", path.display()))?;
    let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {TABLE_NAME}"), [], |r| {
            r.get(0)
        })
        .context("counting rows")?;
    Ok(u64::try_from(count)?)
}

/// Check that the table at `path` holds exactly `expected` rows.
pub fn verify_rows(path: &Path, expected: u64) -> Result<u64> {
    let found = count_rows(path)?;
    ensure!(
        found == expected,
        "dataset at {} has {found} rows, expected {expected}",
        path.display()
    );
    Ok(found)
}

fn create_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE {TABLE_NAME} (
            id INTEGER PRIMARY KEY,
            x  INTEGER NOT NULL,
            a  TEXT NOT NULL,
            b  TEXT NOT NULL,
            c  TEXT NOT NULL,
            d  TEXT NOT NULL
        );"
    ))
    .context("creating schema")?;
    Ok(())
}

fn populate(conn: &mut Connection, spec: &DatasetSpec) -> Result<()> {
    let mut rng = match spec.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let tx = conn.transaction().context("starting insert transaction")?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {TABLE_NAME} (x, a, b, c, d) VALUES (?1, ?2, ?2, ?2, ?2)"
        ))?;
        for i in 0..spec.rows {
            let x = rng.gen_range(0..spec.bucket_range);
            // Content doesn't matter for read cost, only that it is non-null.
            let text = format!("v{i}");
            stmt.execute(params![x, text])
                .with_context(|| format!("inserting row {i}"))?;
        }
    }
    tx.commit().context("committing dataset")?;
    Ok(())
}

/// Remove the database file and any journal siblings left by a previous run.
fn remove_existing(path: &Path) -> Result<()> {
    let candidates = [
        path.to_path_buf(),
        with_suffix(path, "-wal"),
        with_suffix(path, "-shm"),
        with_suffix(path, "-journal"),
    ];
    for candidate in &candidates {
        match fs::remove_file(candidate) {
            Ok(()) => log::debug!("Removed stale {}", candidate.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("removing {}", candidate.display()));
            }
        }
    }
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn bucket_bounds(path: &Path) -> (i64, i64) {
        let conn = Connection::open(path).unwrap();
        conn.query_row(
            &format!("SELECT MIN(x), MAX(x) FROM {TABLE_NAME}"),
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap()
    }

    #[test]
    fn builds_exact_row_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.sqlite3");

        let summary = build(&DatasetSpec::new(&path, 2000, 1000)).unwrap();

        assert_eq!(summary.rows, 2000);
        assert_eq!(count_rows(&path).unwrap(), 2000);
    }

    #[test]
    fn verify_rows_rejects_a_wrong_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("verify.sqlite3");
        build(&DatasetSpec::new(&path, 10, 5)).unwrap();

        assert_eq!(verify_rows(&path, 10).unwrap(), 10);
        assert!(verify_rows(&path, 11).is_err());

        Connection::open(&path)
            .unwrap()
            .execute(
                &format!("DELETE FROM {TABLE_NAME} WHERE id = (SELECT MIN(id) FROM {TABLE_NAME})"),
                [],
            )
            .unwrap();
        assert!(verify_rows(&path, 10).is_err());
    }

    #[test]
    fn zero_rows_still_creates_queryable_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.sqlite3");

        build(&DatasetSpec::new(&path, 0, 10)).unwrap();

        assert_eq!(count_rows(&path).unwrap(), 0);
    }

    #[test]
    fn buckets_stay_inside_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("range.sqlite3");

        build(&DatasetSpec::new(&path, 500, 7)).unwrap();

        let (min, max) = bucket_bounds(&path);
        assert!(min >= 0, "min bucket {min}");
        assert!(max < 7, "max bucket {max}");
    }

    #[test]
    fn bucket_range_of_one_yields_only_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("one.sqlite3");

        build(&DatasetSpec::new(&path, 100, 1)).unwrap();

        assert_eq!(bucket_bounds(&path), (0, 0));
    }

    #[test]
    fn zero_bucket_range_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.sqlite3");

        assert!(build(&DatasetSpec::new(&path, 10, 0)).is_err());
    }

    #[test]
    fn rebuilding_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("twice.sqlite3");
        let spec = DatasetSpec::new(&path, 300, 50);

        build(&spec).unwrap();
        build(&spec).unwrap();

        assert_eq!(count_rows(&path).unwrap(), 300);
        let conn = Connection::open(&path).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn overwrites_unrelated_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.sqlite3");
        fs::write(&path, b"definitely not a database").unwrap();

        build(&DatasetSpec::new(&path, 10, 5)).unwrap();

        assert_eq!(count_rows(&path).unwrap(), 10);
    }

    #[test]
    fn fixed_seed_reproduces_buckets() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a.sqlite3");
        let second = dir.path().join("b.sqlite3");

        let mut spec = DatasetSpec::new(&first, 200, 1000);
        spec.seed = Some(42);
        build(&spec).unwrap();
        spec.path = second.clone();
        build(&spec).unwrap();

        let read = |p: &Path| -> Vec<i64> {
            let conn = Connection::open(p).unwrap();
            let mut stmt = conn
                .prepare(&format!("SELECT x FROM {TABLE_NAME} ORDER BY id"))
                .unwrap();
            let xs = stmt
                .query_map([], |r| r.get(0))
                .unwrap()
                .collect::<rusqlite::Result<Vec<i64>>>()
                .unwrap();
            xs
        };
        assert_eq!(read(&first), read(&second));
    }

    #[test]
    fn rollback_journal_mode_is_supported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("delete.sqlite3");
        let mut spec = DatasetSpec::new(&path, 50, 5);
        spec.journal_mode = JournalMode::Delete;

        let summary = build(&spec).unwrap();

        assert_eq!(summary.journal_mode, JournalMode::Delete);
        assert_eq!(count_rows(&path).unwrap(), 50);
    }
}
