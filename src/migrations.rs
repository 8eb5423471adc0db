//! Versioned schema upgrades for the strategic store.
//!
//! Each SQL step is compiled in and applied once, in order; the highest
//! applied step is recorded in `schema_version`. Steps only add tables or
//! defaulted columns, so rows written by older builds remain valid.

use rusqlite::Connection;

struct Migration {
    version: i32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("migrations/001_baseline.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("migrations/002_ingest_ledger.sql"),
    },
    Migration {
        version: 3,
        sql: include_str!("migrations/003_task_personas.sql"),
    },
    Migration {
        version: 4,
        sql: include_str!("migrations/004_daily_health_snapshots.sql"),
    },
];

fn ensure_version_ledger(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Store: cannot create version ledger: {}", e))
}

fn applied_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Store: cannot read applied version: {}", e))
}

/// Hot copy of the store written next to it as `<file>.v<version>.bak`.
/// In-memory stores are skipped.
fn snapshot_store(conn: &Connection, from_version: i32) -> Result<(), String> {
    let file: String = conn
        .query_row("PRAGMA database_list", [], |row| row.get(2))
        .map_err(|e| format!("Store: cannot resolve file path: {}", e))?;
    if file.is_empty() || file == ":memory:" {
        return Ok(());
    }

    let target = format!("{}.v{}.bak", file, from_version);
    let mut dest = Connection::open(&target)
        .map_err(|e| format!("Store: cannot open snapshot target {}: {}", target, e))?;
    rusqlite::backup::Backup::new(conn, &mut dest)
        .and_then(|copy| copy.step(-1).map(|_| ()))
        .map_err(|e| format!("Store: snapshot before upgrade failed: {}", e))?;

    log::info!("Store: saved v{} snapshot to {}", from_version, target);
    Ok(())
}

/// Bring the schema up to the newest embedded version.
///
/// Returns how many steps were applied. A store stamped with a version this
/// binary does not know is left untouched and reported as an error.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    ensure_version_ledger(conn)?;

    let from = applied_version(conn)?;
    let newest = MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0);
    if from > newest {
        return Err(format!(
            "Store schema v{} is newer than this build understands (v{})",
            from, newest
        ));
    }

    let steps: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > from).collect();
    if steps.is_empty() {
        return Ok(0);
    }
    if from > 0 {
        snapshot_store(conn, from)?;
    }

    for step in &steps {
        let script = format!(
            "BEGIN;\n{}\nINSERT INTO schema_version (version) VALUES ({});\nCOMMIT;",
            step.sql, step.version
        );
        if let Err(e) = conn.execute_batch(&script) {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(format!("Store: upgrade to v{} failed: {}", step.version, e));
        }
        log::info!("Store: schema now at v{}", step.version);
    }

    Ok(steps.len())
}
