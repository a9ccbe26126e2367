//! Assessment processor: turns one queued message into reports or history.
//!
//! Flow:
//! 1. Parse and drop empty payloads
//! 2. Resolve the submission token (with historical fallback)
//! 3. Cooldown gate
//! 4. Delivery-status signals short-circuit into contact-attempt history
//! 5. Pin the threshold definition by hash
//! 6. Explicit symptoms → one report; yes/no → household fan-out
//!
//! Symptom values and raw payloads are never logged.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::model::{Report, SYSTEM_AUTHOR, WhoReported};
use crate::pipeline::contact_attempt::record_contact_attempt;
use crate::pipeline::dedup::DedupGate;
use crate::pipeline::evaluator::is_symptomatic;
use crate::pipeline::household::{active_members, fan_out};
use crate::pipeline::materializer::{SymptomIntent, explicit_condition, infer_condition};
use crate::pipeline::resolver::{Resolved, resolve_monitoree};
use crate::pipeline::types::{AssessmentMessage, IntakeOutcome};
use crate::store::Database;

/// Consumes queued self-reports. Safe to share across concurrent workers.
pub struct AssessmentProcessor {
    db: Arc<dyn Database>,
    dedup: DedupGate,
    author: String,
}

impl AssessmentProcessor {
    pub fn new(db: Arc<dyn Database>, config: &IntakeConfig) -> Self {
        Self {
            db,
            dedup: DedupGate::new(config.reporting_cooldown),
            author: SYSTEM_AUTHOR.to_string(),
        }
    }

    /// Builder: author recorded on contact-attempt history rows.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Process one raw message. Every failure is logged and folded into the outcome.
    pub async fn consume(&self, raw: &str) -> IntakeOutcome {
        let message = match AssessmentMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                // serde's message can echo field contents; position only.
                warn!(
                    category = ?e.classify(),
                    line = e.line(),
                    column = e.column(),
                    "Dropping malformed message"
                );
                return IntakeOutcome::Malformed;
            }
        };

        match self.process(message).await {
            Ok(outcome) => {
                debug!(outcome = outcome.label(), "Message consumed");
                outcome
            }
            Err(IntakeError::InvalidSymptom { name, .. }) => {
                warn!(symptom = %name, "Dropping message with invalid symptom");
                IntakeOutcome::Malformed
            }
            Err(e) => {
                error!(error = %e, "Failed to process assessment message");
                IntakeOutcome::Failed
            }
        }
    }

    async fn process(&self, message: AssessmentMessage) -> Result<IntakeOutcome, IntakeError> {
        if message.is_empty() {
            info!("Dropping message with no recognised fields");
            return Ok(IntakeOutcome::Empty);
        }

        let Some(Resolved { monitoree, token }) =
            resolve_monitoree(self.db.as_ref(), message.patient_submission_token.as_deref())
                .await?
        else {
            return Ok(IntakeOutcome::UnknownMonitoree);
        };

        if self
            .dedup
            .is_duplicate(self.db.as_ref(), &monitoree, Utc::now())
            .await?
        {
            return Ok(IntakeOutcome::Duplicate {
                monitoree_id: monitoree.id,
            });
        }

        if let Some(status) = message.response_status {
            let dependents =
                record_contact_attempt(self.db.as_ref(), &monitoree, status, &self.author).await?;
            return Ok(IntakeOutcome::ContactAttemptRecorded {
                monitoree_id: monitoree.id,
                dependents,
            });
        }

        let hash = message.threshold_condition_hash.as_deref().unwrap_or_default();
        let Some(threshold) = self.db.get_threshold_definition(hash).await? else {
            warn!(
                monitoree_id = %monitoree.id,
                threshold_hash = %hash,
                "Dropping message: unknown threshold definition"
            );
            return Ok(IntakeOutcome::UnknownThreshold {
                monitoree_id: monitoree.id,
            });
        };

        let reports = match message.reported_symptoms_array {
            Some(raw) => {
                let condition = explicit_condition(&threshold.hash, raw)?;
                let symptomatic =
                    is_symptomatic(&condition, &threshold, message.experiencing_symptoms);
                vec![Report::new(
                    monitoree.id,
                    condition,
                    symptomatic,
                    WhoReported::Monitoree,
                )]
            }
            None => {
                let intent = SymptomIntent::from_flag(message.experiencing_symptoms);
                let condition = infer_condition(&threshold, intent);
                let symptomatic =
                    is_symptomatic(&condition, &threshold, message.experiencing_symptoms);
                let members = active_members(self.db.as_ref(), &monitoree).await?;
                fan_out(&members, &condition, symptomatic, token)
            }
        };

        // All or nothing: a partial write would leave the redelivery to the
        // cooldown gate with the remaining members unreported.
        self.db.insert_reports(&reports).await?;
        let ids: Vec<_> = reports.iter().map(|r| r.id).collect();

        info!(
            monitoree_id = %monitoree.id,
            threshold_hash = %threshold.hash,
            reports = ids.len(),
            "Recorded assessment"
        );
        Ok(IntakeOutcome::Reported {
            monitoree_id: monitoree.id,
            reports: ids,
        })
    }
}
