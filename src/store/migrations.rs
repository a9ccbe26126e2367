//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS monitorees (
                id TEXT PRIMARY KEY,
                responder_id TEXT NOT NULL,
                jurisdiction_id TEXT NOT NULL,
                submission_token TEXT NOT NULL UNIQUE,
                primary_telephone TEXT,
                email TEXT,
                preferred_contact_method TEXT NOT NULL DEFAULT 'unknown',
                monitoring INTEGER NOT NULL DEFAULT 1,
                purged INTEGER NOT NULL DEFAULT 0,
                last_assessment_reminder_sent TEXT,
                latest_assessment TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_monitorees_responder ON monitorees(responder_id);

            CREATE TABLE IF NOT EXISTS token_mappings (
                old_token TEXT PRIMARY KEY,
                new_token TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS threshold_definitions (
                hash TEXT PRIMARY KEY,
                jurisdiction_id TEXT NOT NULL,
                symptoms TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_thresholds_jurisdiction
                ON threshold_definitions(jurisdiction_id, created_at);

            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                monitoree_id TEXT NOT NULL REFERENCES monitorees(id),
                threshold_hash TEXT NOT NULL REFERENCES threshold_definitions(hash),
                symptoms TEXT NOT NULL,
                symptomatic INTEGER NOT NULL,
                who_reported TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reports_monitoree ON reports(monitoree_id, created_at);

            CREATE TABLE IF NOT EXISTS histories (
                id TEXT PRIMARY KEY,
                monitoree_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                author TEXT NOT NULL,
                comment TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_histories_monitoree ON histories(monitoree_id, created_at);
        "#,
    },
    Migration {
        version: 2,
        name: "blocked_numbers",
        sql: r#"
            CREATE TABLE IF NOT EXISTS blocked_numbers (
                phone_number TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 3,
        name: "report_latest_assessment_trigger",
        // Runs inside the inserting statement, so a multi-row report insert
        // and every stamp it implies commit or fail together.
        sql: r#"
            CREATE TRIGGER IF NOT EXISTS reports_stamp_latest_assessment
            AFTER INSERT ON reports
            BEGIN
                UPDATE monitorees
                SET latest_assessment = NEW.created_at, updated_at = NEW.created_at
                WHERE id = NEW.monitoree_id;
            END;
        "#,
    },
];

/// Apply every migration newer than the recorded version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::debug!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
