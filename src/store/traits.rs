//! Unified `Database` trait, the single async interface for all persistence.
//!
//! Every operation is scoped to one monitoree (or one household) so that
//! concurrent invocations for different monitorees never contend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{HistoryEntry, Monitoree, Report, ThresholdDefinition};

/// Backend-agnostic database trait covering monitorees, schemas, reports, and history.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Monitorees ──────────────────────────────────────────────────

    /// Insert a new monitoree.
    async fn insert_monitoree(&self, monitoree: &Monitoree) -> Result<(), DatabaseError>;

    /// Get a monitoree by ID, purged or not.
    async fn get_monitoree(&self, id: Uuid) -> Result<Option<Monitoree>, DatabaseError>;

    /// Find the non-purged monitoree holding `token` as its current submission token.
    async fn get_active_monitoree_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Monitoree>, DatabaseError>;

    /// Actively monitored, non-purged monitorees whose responder is `responder_id`.
    ///
    /// Includes the responder itself when it is self-responding and active.
    async fn list_active_household(
        &self,
        responder_id: Uuid,
    ) -> Result<Vec<Monitoree>, DatabaseError>;

    /// Null out `last_assessment_reminder_sent` so the scheduler contacts the monitoree again.
    async fn clear_last_reminder_sent(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// Stamp `last_assessment_reminder_sent`.
    async fn mark_reminder_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError>;

    /// Replace a monitoree's submission token, remembering the retired one.
    async fn rotate_submission_token(
        &self,
        id: Uuid,
        new_token: &str,
    ) -> Result<(), DatabaseError>;

    // ── Historical tokens ───────────────────────────────────────────

    /// Record that `old_token` now maps to `new_token`.
    async fn insert_token_mapping(
        &self,
        old_token: &str,
        new_token: &str,
    ) -> Result<(), DatabaseError>;

    /// Resolve a retired token to its replacement.
    async fn lookup_current_token(&self, old_token: &str) -> Result<Option<String>, DatabaseError>;

    // ── Threshold definitions ───────────────────────────────────────

    /// Store a definition unless one with the same hash exists.
    /// Returns `true` when a row was written.
    async fn insert_threshold_definition(
        &self,
        definition: &ThresholdDefinition,
    ) -> Result<bool, DatabaseError>;

    /// Exact-match lookup by content hash.
    async fn get_threshold_definition(
        &self,
        hash: &str,
    ) -> Result<Option<ThresholdDefinition>, DatabaseError>;

    /// The most recently created definition for a jurisdiction.
    async fn latest_threshold_for_jurisdiction(
        &self,
        jurisdiction_id: &str,
    ) -> Result<Option<ThresholdDefinition>, DatabaseError>;

    // ── Reports ─────────────────────────────────────────────────────

    /// Insert a report and stamp the monitoree's `latest_assessment`.
    async fn insert_report(&self, report: &Report) -> Result<(), DatabaseError> {
        self.insert_reports(std::slice::from_ref(report)).await
    }

    /// Insert a batch of reports as one statement, stamping each monitoree's
    /// `latest_assessment`. Either every row lands or none do.
    async fn insert_reports(&self, reports: &[Report]) -> Result<(), DatabaseError>;

    /// Creation time of the monitoree's newest report.
    async fn latest_report_at(
        &self,
        monitoree_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError>;

    /// Reports for a monitoree, oldest first.
    async fn list_reports(&self, monitoree_id: Uuid) -> Result<Vec<Report>, DatabaseError>;

    // ── History ─────────────────────────────────────────────────────

    /// Append one history row.
    async fn insert_history(&self, entry: &HistoryEntry) -> Result<(), DatabaseError>;

    /// Append many history rows with a single statement. Empty input is a no-op.
    async fn insert_histories(&self, entries: &[HistoryEntry]) -> Result<(), DatabaseError>;

    /// History rows for a monitoree, oldest first.
    async fn list_history(&self, monitoree_id: Uuid) -> Result<Vec<HistoryEntry>, DatabaseError>;

    // ── Blocked numbers ─────────────────────────────────────────────

    /// Whether `phone_number` is on the block list.
    async fn is_number_blocked(&self, phone_number: &str) -> Result<bool, DatabaseError>;

    /// Add `phone_number` to the block list if absent.
    /// Returns `true` when a row was written.
    async fn block_number(&self, phone_number: &str) -> Result<bool, DatabaseError>;

    /// Number of block-list rows for `phone_number` (0 or 1).
    async fn count_blocked(&self, phone_number: &str) -> Result<usize, DatabaseError>;
}
