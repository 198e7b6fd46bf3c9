use rusqlite::Connection;

use crate::error::Result;

/// Run all migrations on the database.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode=WAL;

        CREATE TABLE IF NOT EXISTS runs (
            id              TEXT PRIMARY KEY,
            scenario        TEXT NOT NULL,
            iterations      INTEGER NOT NULL,
            nodes           INTEGER NOT NULL,
            status          TEXT NOT NULL DEFAULT 'in_progress',
            bytes           INTEGER NOT NULL DEFAULT 0,
            elapsed_ms      INTEGER NOT NULL DEFAULT 0,
            throughput_mb_s REAL NOT NULL DEFAULT 0,
            error           TEXT,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            completed_at    TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_runs_scenario ON runs(scenario);
        ",
    )?;
    Ok(())
}
