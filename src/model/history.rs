//! Append-only audit history attached to monitorees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// A reply channel reported that the monitoree could not be reached.
    ContactAttempt,
    /// An outbound report reminder failed to deliver.
    UnsuccessfulReportReminder,
    /// An outbound report reminder was delivered.
    ReportReminder,
}

impl std::fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContactAttempt => write!(f, "Contact Attempt"),
            Self::UnsuccessfulReportReminder => write!(f, "Unsuccessful Report Reminder"),
            Self::ReportReminder => write!(f, "Report Reminder"),
        }
    }
}

impl std::str::FromStr for HistoryKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Contact Attempt" => Ok(Self::ContactAttempt),
            "Unsuccessful Report Reminder" => Ok(Self::UnsuccessfulReportReminder),
            "Report Reminder" => Ok(Self::ReportReminder),
            _ => Err(format!("Unknown history kind: {}", s)),
        }
    }
}

/// One history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub monitoree_id: Uuid,
    pub kind: HistoryKind,
    pub author: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        monitoree_id: Uuid,
        kind: HistoryKind,
        author: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            monitoree_id,
            kind,
            author: author.into(),
            comment: comment.into(),
            created_at: Utc::now(),
        }
    }
}
