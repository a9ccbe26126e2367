//! Shared types for the assessment ingestion pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Inbound message ─────────────────────────────────────────────────

/// Non-content delivery signal relayed by a reply channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    NoAnswerVoice,
    NoAnswerSms,
    ErrorVoice,
    ErrorSms,
}

impl ResponseStatus {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoAnswerVoice => "no_answer_voice",
            Self::NoAnswerSms => "no_answer_sms",
            Self::ErrorVoice => "error_voice",
            Self::ErrorSms => "error_sms",
        }
    }
}

/// One queued self-report, reduced to the recognised fields.
///
/// Unknown fields are ignored; `null` is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AssessmentMessage {
    #[serde(default)]
    pub threshold_condition_hash: Option<String>,
    /// Explicit symptom list; decoded lazily so a bad entry can be reported by name.
    #[serde(default)]
    pub reported_symptoms_array: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub patient_submission_token: Option<String>,
    #[serde(default)]
    pub experiencing_symptoms: Option<bool>,
    #[serde(default)]
    pub response_status: Option<ResponseStatus>,
}

impl AssessmentMessage {
    /// Parse a raw queue payload.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// No recognised field survived extraction.
    pub fn is_empty(&self) -> bool {
        self.threshold_condition_hash.is_none()
            && self.reported_symptoms_array.is_none()
            && self.patient_submission_token.is_none()
            && self.experiencing_symptoms.is_none()
            && self.response_status.is_none()
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Terminal branch reached by one invocation. Never an error to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Payload was not valid JSON or had mistyped fields.
    Malformed,
    /// No recognised field present.
    Empty,
    /// Token resolved to no active monitoree, directly or via history.
    UnknownMonitoree,
    /// A report was already recorded inside the cooldown window.
    Duplicate { monitoree_id: Uuid },
    /// A delivery-status signal was recorded as contact-attempt history.
    ContactAttemptRecorded { monitoree_id: Uuid, dependents: usize },
    /// The referenced threshold hash is not stored.
    UnknownThreshold { monitoree_id: Uuid },
    /// Reports were created.
    Reported { monitoree_id: Uuid, reports: Vec<Uuid> },
    /// Storage failed part-way; logged.
    Failed,
}

impl IntakeOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Empty => "empty",
            Self::UnknownMonitoree => "unknown_monitoree",
            Self::Duplicate { .. } => "duplicate",
            Self::ContactAttemptRecorded { .. } => "contact_attempt",
            Self::UnknownThreshold { .. } => "unknown_threshold",
            Self::Reported { .. } => "reported",
            Self::Failed => "failed",
        }
    }

    /// Number of reports this invocation created.
    pub fn report_count(&self) -> usize {
        match self {
            Self::Reported { reports, .. } => reports.len(),
            _ => 0,
        }
    }
}
