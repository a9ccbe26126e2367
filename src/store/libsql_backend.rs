//! libSQL implementation of the `Database` trait.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    Condition, HistoryEntry, HistoryKind, Monitoree, Report, Symptom, ThresholdDefinition,
    ThresholdSymptom, WhoReported,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run a query expected to yield at most one row and map it.
    async fn query_one<T>(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
        map: impl FnOnce(&libsql::Row) -> Result<T, DatabaseError>,
    ) -> Result<Option<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => map(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }

    /// Run a query and map every row.
    async fn query_all<T>(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
        map: impl Fn(&libsql::Row) -> Result<T, DatabaseError>,
    ) -> Result<Vec<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut out = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => out.push(map(&row)?),
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("{op}: {e}"))),
            }
        }
        Ok(out)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format: fixed-width RFC 3339 so text ordering matches time ordering.
fn fmt_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn parse_uuid(s: &str, column: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("{column}: {e}")))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_datetime(dt: Option<&DateTime<Utc>>) -> libsql::Value {
    match dt {
        Some(dt) => libsql::Value::Text(fmt_datetime(dt)),
        None => libsql::Value::Null,
    }
}

fn row_err(op: &str) -> impl Fn(libsql::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::Query(format!("{op} row parse: {e}"))
}

/// Map a libsql Row to a Monitoree.
///
/// Column order matches MONITOREE_COLUMNS.
fn row_to_monitoree(row: &libsql::Row) -> Result<Monitoree, DatabaseError> {
    let err = row_err("monitoree");
    let id: String = row.get(0).map_err(&err)?;
    let responder_id: String = row.get(1).map_err(&err)?;
    let method: String = row.get(6).map_err(&err)?;
    let monitoring: i64 = row.get(7).map_err(&err)?;
    let purged: i64 = row.get(8).map_err(&err)?;
    let last_reminder: Option<String> = row.get::<String>(9).ok();
    let latest_assessment: Option<String> = row.get::<String>(10).ok();
    let created: String = row.get(11).map_err(&err)?;

    Ok(Monitoree {
        id: parse_uuid(&id, "monitorees.id")?,
        responder_id: parse_uuid(&responder_id, "monitorees.responder_id")?,
        jurisdiction_id: row.get(2).map_err(&err)?,
        submission_token: row.get(3).map_err(&err)?,
        primary_telephone: row.get::<String>(4).ok(),
        email: row.get::<String>(5).ok(),
        preferred_contact_method: method.parse().unwrap_or_default(),
        monitoring: monitoring != 0,
        purged: purged != 0,
        last_assessment_reminder_sent: parse_optional_datetime(&last_reminder),
        latest_assessment: parse_optional_datetime(&latest_assessment),
        created_at: parse_datetime(&created),
    })
}

/// Column order: hash, jurisdiction_id, symptoms, created_at.
fn row_to_threshold(row: &libsql::Row) -> Result<ThresholdDefinition, DatabaseError> {
    let err = row_err("threshold_definition");
    let symptoms_json: String = row.get(2).map_err(&err)?;
    let created: String = row.get(3).map_err(&err)?;
    let symptoms: Vec<ThresholdSymptom> = serde_json::from_str(&symptoms_json)
        .map_err(|e| DatabaseError::Serialization(format!("threshold symptoms: {e}")))?;

    Ok(ThresholdDefinition {
        hash: row.get(0).map_err(&err)?,
        jurisdiction_id: row.get(1).map_err(&err)?,
        symptoms,
        created_at: parse_datetime(&created),
    })
}

/// Column order matches REPORT_COLUMNS.
fn row_to_report(row: &libsql::Row) -> Result<Report, DatabaseError> {
    let err = row_err("report");
    let id: String = row.get(0).map_err(&err)?;
    let monitoree_id: String = row.get(1).map_err(&err)?;
    let threshold_hash: String = row.get(2).map_err(&err)?;
    let symptoms_json: String = row.get(3).map_err(&err)?;
    let symptomatic: i64 = row.get(4).map_err(&err)?;
    let who_reported: String = row.get(5).map_err(&err)?;
    let created: String = row.get(6).map_err(&err)?;

    let symptoms: Vec<Symptom> = serde_json::from_str(&symptoms_json)
        .map_err(|e| DatabaseError::Serialization(format!("report symptoms: {e}")))?;
    let who_reported: WhoReported = who_reported
        .parse()
        .map_err(DatabaseError::Serialization)?;

    Ok(Report {
        id: parse_uuid(&id, "reports.id")?,
        monitoree_id: parse_uuid(&monitoree_id, "reports.monitoree_id")?,
        condition: Condition::new(threshold_hash, symptoms),
        symptomatic: symptomatic != 0,
        who_reported,
        created_at: parse_datetime(&created),
    })
}

/// Column order matches HISTORY_COLUMNS.
fn row_to_history(row: &libsql::Row) -> Result<HistoryEntry, DatabaseError> {
    let err = row_err("history");
    let id: String = row.get(0).map_err(&err)?;
    let monitoree_id: String = row.get(1).map_err(&err)?;
    let kind: String = row.get(2).map_err(&err)?;
    let created: String = row.get(5).map_err(&err)?;
    let kind: HistoryKind = kind.parse().map_err(DatabaseError::Serialization)?;

    Ok(HistoryEntry {
        id: parse_uuid(&id, "histories.id")?,
        monitoree_id: parse_uuid(&monitoree_id, "histories.monitoree_id")?,
        kind,
        author: row.get(3).map_err(&err)?,
        comment: row.get(4).map_err(&err)?,
        created_at: parse_datetime(&created),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const MONITOREE_COLUMNS: &str = "id, responder_id, jurisdiction_id, submission_token, primary_telephone, email, preferred_contact_method, monitoring, purged, last_assessment_reminder_sent, latest_assessment, created_at";

const THRESHOLD_COLUMNS: &str = "hash, jurisdiction_id, symptoms, created_at";

const REPORT_COLUMNS: &str =
    "id, monitoree_id, threshold_hash, symptoms, symptomatic, who_reported, created_at";

const HISTORY_COLUMNS: &str = "id, monitoree_id, kind, author, comment, created_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Monitorees ──────────────────────────────────────────────────

    async fn insert_monitoree(&self, monitoree: &Monitoree) -> Result<(), DatabaseError> {
        let now = fmt_datetime(&Utc::now());
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO monitorees ({MONITOREE_COLUMNS}, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    monitoree.id.to_string(),
                    monitoree.responder_id.to_string(),
                    monitoree.jurisdiction_id.clone(),
                    monitoree.submission_token.clone(),
                    opt_text(monitoree.primary_telephone.as_deref()),
                    opt_text(monitoree.email.as_deref()),
                    monitoree.preferred_contact_method.to_string(),
                    monitoree.monitoring as i64,
                    monitoree.purged as i64,
                    opt_datetime(monitoree.last_assessment_reminder_sent.as_ref()),
                    opt_datetime(monitoree.latest_assessment.as_ref()),
                    fmt_datetime(&monitoree.created_at),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_monitoree: {e}")))?;

        debug!(monitoree_id = %monitoree.id, "Monitoree inserted into DB");
        Ok(())
    }

    async fn get_monitoree(&self, id: Uuid) -> Result<Option<Monitoree>, DatabaseError> {
        self.query_one(
            "get_monitoree",
            &format!("SELECT {MONITOREE_COLUMNS} FROM monitorees WHERE id = ?1"),
            params![id.to_string()],
            row_to_monitoree,
        )
        .await
    }

    async fn get_active_monitoree_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Monitoree>, DatabaseError> {
        self.query_one(
            "get_active_monitoree_by_token",
            &format!(
                "SELECT {MONITOREE_COLUMNS} FROM monitorees WHERE submission_token = ?1 AND purged = 0"
            ),
            params![token],
            row_to_monitoree,
        )
        .await
    }

    async fn list_active_household(
        &self,
        responder_id: Uuid,
    ) -> Result<Vec<Monitoree>, DatabaseError> {
        self.query_all(
            "list_active_household",
            &format!(
                "SELECT {MONITOREE_COLUMNS} FROM monitorees
                 WHERE responder_id = ?1 AND monitoring = 1 AND purged = 0
                 ORDER BY created_at ASC"
            ),
            params![responder_id.to_string()],
            row_to_monitoree,
        )
        .await
    }

    async fn clear_last_reminder_sent(&self, id: Uuid) -> Result<(), DatabaseError> {
        let now = fmt_datetime(&Utc::now());
        self.conn()
            .execute(
                "UPDATE monitorees SET last_assessment_reminder_sent = NULL, updated_at = ?1 WHERE id = ?2",
                params![now, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_last_reminder_sent: {e}")))?;

        debug!(monitoree_id = %id, "Cleared last reminder timestamp");
        Ok(())
    }

    async fn mark_reminder_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let now = fmt_datetime(&Utc::now());
        self.conn()
            .execute(
                "UPDATE monitorees SET last_assessment_reminder_sent = ?1, updated_at = ?2 WHERE id = ?3",
                params![fmt_datetime(&at), now, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_reminder_sent: {e}")))?;
        Ok(())
    }

    async fn rotate_submission_token(
        &self,
        id: Uuid,
        new_token: &str,
    ) -> Result<(), DatabaseError> {
        let monitoree = self
            .get_monitoree(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "monitoree".into(),
                id: id.to_string(),
            })?;
        let old_token = monitoree.submission_token;
        let now = fmt_datetime(&Utc::now());

        self.conn()
            .execute(
                "UPDATE monitorees SET submission_token = ?1, updated_at = ?2 WHERE id = ?3",
                params![new_token, now, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("rotate_submission_token: {e}")))?;

        // Older retired tokens keep resolving in one hop.
        self.conn()
            .execute(
                "UPDATE token_mappings SET new_token = ?1 WHERE new_token = ?2",
                params![new_token, old_token.clone()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("rotate_submission_token remap: {e}")))?;

        self.insert_token_mapping(&old_token, new_token).await?;
        info!(monitoree_id = %id, "Submission token rotated");
        Ok(())
    }

    // ── Historical tokens ───────────────────────────────────────────

    async fn insert_token_mapping(
        &self,
        old_token: &str,
        new_token: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO token_mappings (old_token, new_token, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(old_token) DO UPDATE SET new_token = excluded.new_token",
                params![old_token, new_token, fmt_datetime(&Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_token_mapping: {e}")))?;
        Ok(())
    }

    async fn lookup_current_token(&self, old_token: &str) -> Result<Option<String>, DatabaseError> {
        self.query_one(
            "lookup_current_token",
            "SELECT new_token FROM token_mappings WHERE old_token = ?1",
            params![old_token],
            |row| row.get::<String>(0).map_err(row_err("token_mapping")),
        )
        .await
    }

    // ── Threshold definitions ───────────────────────────────────────

    async fn insert_threshold_definition(
        &self,
        definition: &ThresholdDefinition,
    ) -> Result<bool, DatabaseError> {
        let symptoms = serde_json::to_string(&definition.symptoms)
            .map_err(|e| DatabaseError::Serialization(format!("threshold symptoms: {e}")))?;

        let inserted = self
            .conn()
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO threshold_definitions ({THRESHOLD_COLUMNS}) VALUES (?1, ?2, ?3, ?4)"
                ),
                params![
                    definition.hash.clone(),
                    definition.jurisdiction_id.clone(),
                    symptoms,
                    fmt_datetime(&definition.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_threshold_definition: {e}")))?;

        if inserted > 0 {
            debug!(hash = %definition.hash, jurisdiction = %definition.jurisdiction_id, "Threshold definition stored");
        }
        Ok(inserted > 0)
    }

    async fn get_threshold_definition(
        &self,
        hash: &str,
    ) -> Result<Option<ThresholdDefinition>, DatabaseError> {
        self.query_one(
            "get_threshold_definition",
            &format!("SELECT {THRESHOLD_COLUMNS} FROM threshold_definitions WHERE hash = ?1"),
            params![hash],
            row_to_threshold,
        )
        .await
    }

    async fn latest_threshold_for_jurisdiction(
        &self,
        jurisdiction_id: &str,
    ) -> Result<Option<ThresholdDefinition>, DatabaseError> {
        self.query_one(
            "latest_threshold_for_jurisdiction",
            &format!(
                "SELECT {THRESHOLD_COLUMNS} FROM threshold_definitions
                 WHERE jurisdiction_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1"
            ),
            params![jurisdiction_id],
            row_to_threshold,
        )
        .await
    }

    // ── Reports ─────────────────────────────────────────────────────

    async fn insert_reports(&self, reports: &[Report]) -> Result<(), DatabaseError> {
        if reports.is_empty() {
            return Ok(());
        }

        // One statement: the latest_assessment trigger fires inside it, so a
        // failing row rolls back every report and stamp in the batch.
        let placeholders = vec!["(?, ?, ?, ?, ?, ?, ?)"; reports.len()].join(", ");
        let mut values: Vec<libsql::Value> = Vec::with_capacity(reports.len() * 7);
        for report in reports {
            let symptoms = serde_json::to_string(&report.condition.symptoms)
                .map_err(|e| DatabaseError::Serialization(format!("report symptoms: {e}")))?;
            values.push(libsql::Value::Text(report.id.to_string()));
            values.push(libsql::Value::Text(report.monitoree_id.to_string()));
            values.push(libsql::Value::Text(report.condition.threshold_hash.clone()));
            values.push(libsql::Value::Text(symptoms));
            values.push(libsql::Value::Integer(report.symptomatic as i64));
            values.push(libsql::Value::Text(report.who_reported.to_string()));
            values.push(libsql::Value::Text(fmt_datetime(&report.created_at)));
        }

        self.conn()
            .execute(
                &format!("INSERT INTO reports ({REPORT_COLUMNS}) VALUES {placeholders}"),
                libsql::params_from_iter(values),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_reports: {e}")))?;

        debug!(count = reports.len(), "Reports inserted into DB");
        Ok(())
    }

    async fn latest_report_at(
        &self,
        monitoree_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        self.query_one(
            "latest_report_at",
            "SELECT created_at FROM reports WHERE monitoree_id = ?1 ORDER BY created_at DESC LIMIT 1",
            params![monitoree_id.to_string()],
            |row| {
                let created: String = row.get(0).map_err(row_err("latest_report_at"))?;
                Ok(parse_datetime(&created))
            },
        )
        .await
    }

    async fn list_reports(&self, monitoree_id: Uuid) -> Result<Vec<Report>, DatabaseError> {
        self.query_all(
            "list_reports",
            &format!(
                "SELECT {REPORT_COLUMNS} FROM reports WHERE monitoree_id = ?1 ORDER BY created_at ASC"
            ),
            params![monitoree_id.to_string()],
            row_to_report,
        )
        .await
    }

    // ── History ─────────────────────────────────────────────────────

    async fn insert_history(&self, entry: &HistoryEntry) -> Result<(), DatabaseError> {
        self.insert_histories(std::slice::from_ref(entry)).await
    }

    async fn insert_histories(&self, entries: &[HistoryEntry]) -> Result<(), DatabaseError> {
        if entries.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["(?, ?, ?, ?, ?, ?)"; entries.len()].join(", ");
        let mut values: Vec<libsql::Value> = Vec::with_capacity(entries.len() * 6);
        for entry in entries {
            values.push(libsql::Value::Text(entry.id.to_string()));
            values.push(libsql::Value::Text(entry.monitoree_id.to_string()));
            values.push(libsql::Value::Text(entry.kind.to_string()));
            values.push(libsql::Value::Text(entry.author.clone()));
            values.push(libsql::Value::Text(entry.comment.clone()));
            values.push(libsql::Value::Text(fmt_datetime(&entry.created_at)));
        }

        self.conn()
            .execute(
                &format!("INSERT INTO histories ({HISTORY_COLUMNS}) VALUES {placeholders}"),
                libsql::params_from_iter(values),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_histories: {e}")))?;

        debug!(count = entries.len(), "History rows inserted into DB");
        Ok(())
    }

    async fn list_history(&self, monitoree_id: Uuid) -> Result<Vec<HistoryEntry>, DatabaseError> {
        self.query_all(
            "list_history",
            &format!(
                "SELECT {HISTORY_COLUMNS} FROM histories WHERE monitoree_id = ?1 ORDER BY created_at ASC, rowid ASC"
            ),
            params![monitoree_id.to_string()],
            row_to_history,
        )
        .await
    }

    // ── Blocked numbers ─────────────────────────────────────────────

    async fn is_number_blocked(&self, phone_number: &str) -> Result<bool, DatabaseError> {
        Ok(self.count_blocked(phone_number).await? > 0)
    }

    async fn block_number(&self, phone_number: &str) -> Result<bool, DatabaseError> {
        if self.is_number_blocked(phone_number).await? {
            return Ok(false);
        }

        // UNIQUE index covers a concurrent insert that slips past the check.
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO blocked_numbers (phone_number, created_at) VALUES (?1, ?2)",
                params![phone_number, fmt_datetime(&Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("block_number: {e}")))?;

        if inserted > 0 {
            info!("Phone number added to block list");
        }
        Ok(inserted > 0)
    }

    async fn count_blocked(&self, phone_number: &str) -> Result<usize, DatabaseError> {
        let count = self
            .query_one(
                "count_blocked",
                "SELECT COUNT(*) FROM blocked_numbers WHERE phone_number = ?1",
                params![phone_number],
                |row| row.get::<i64>(0).map_err(row_err("count_blocked")),
            )
            .await?;
        Ok(count.unwrap_or(0) as usize)
    }
}
