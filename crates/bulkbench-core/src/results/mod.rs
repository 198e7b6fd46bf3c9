mod schema;

use rusqlite::{Connection, Row, params};
use std::path::Path;

use crate::error::{HarnessError, Result};
use crate::types::{BenchmarkMetric, RunRecord, RunStatus};

const RUN_COLUMNS: &str = "id, scenario, iterations, nodes, status, bytes, elapsed_ms, throughput_mb_s, error, created_at, completed_at";

/// Ledger of benchmark runs.
pub struct ResultsDb {
    conn: Connection,
}

impl ResultsDb {
    /// Open (or create) the results database and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn create_run(&self, id: &str, scenario: &str, iterations: u64, nodes: usize) -> Result<()> {
        self.conn.execute(
            "INSERT INTO runs (id, scenario, iterations, nodes) VALUES (?1, ?2, ?3, ?4)",
            params![id, scenario, iterations, nodes],
        )?;
        Ok(())
    }

    pub fn complete_run(&self, id: &str, metric: &BenchmarkMetric) -> Result<()> {
        let elapsed_ms = u64::try_from(metric.elapsed.as_millis()).unwrap_or(u64::MAX);
        self.conn.execute(
            "UPDATE runs SET status='passed', bytes=?2, elapsed_ms=?3, throughput_mb_s=?4, completed_at=strftime('%Y-%m-%d %H:%M:%f', 'now') WHERE id=?1",
            params![id, metric.bytes, elapsed_ms, metric.throughput_mb_s()],
        )?;
        Ok(())
    }

    pub fn fail_run(&self, id: &str, error: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET status='failed', error=?2, completed_at=strftime('%Y-%m-%d %H:%M:%f', 'now') WHERE id=?1",
            params![id, error],
        )?;
        Ok(())
    }

    pub fn get_run(&self, id: &str) -> Result<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id=?1"),
                params![id],
                run_from_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    HarnessError::Config(format!("run {id} not found"))
                }
                other => HarnessError::Database(other),
            })
    }

    /// Runs newest first, optionally restricted to one scenario.
    pub fn list_runs(&self, scenario: Option<&str>) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE (?1 IS NULL OR scenario = ?1) ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![scenario], run_from_row)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn latest_run(&self, scenario: Option<&str>) -> Result<Option<RunRecord>> {
        Ok(self.list_runs(scenario)?.into_iter().next())
    }
}

/// Runs as a pretty-printed JSON array.
pub fn runs_to_json(runs: &[RunRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(runs)?)
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        scenario: row.get(1)?,
        iterations: row.get(2)?,
        nodes: row.get(3)?,
        status: row
            .get::<_, String>(4)?
            .parse()
            .unwrap_or(RunStatus::Failed),
        bytes: row.get(5)?,
        elapsed_ms: row.get(6)?,
        throughput_mb_s: row.get(7)?,
        error: row.get(8)?,
        created_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}
