//! Cooldown gate against duplicate deliveries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::DatabaseError;
use crate::model::Monitoree;
use crate::store::Database;

/// Drops messages for monitorees that already reported within `cooldown`.
///
/// Two deliveries racing inside the window can both pass; no lock is taken.
#[derive(Debug, Clone, Copy)]
pub struct DedupGate {
    cooldown: Duration,
}

impl DedupGate {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    /// Whether a report created at `latest` falls inside the window ending at `now`.
    pub fn within_window(&self, latest: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let window = chrono::Duration::from_std(self.cooldown).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(latest) <= window
    }

    /// Check the monitoree's newest report against the window.
    pub async fn is_duplicate(
        &self,
        db: &dyn Database,
        monitoree: &Monitoree,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let Some(latest) = db.latest_report_at(monitoree.id).await? else {
            return Ok(false);
        };
        let duplicate = self.within_window(latest, now);
        if duplicate {
            info!(
                monitoree_id = %monitoree.id,
                cooldown_secs = self.cooldown.as_secs(),
                "Dropping message: report already recorded inside cooldown window"
            );
        }
        Ok(duplicate)
    }
}
