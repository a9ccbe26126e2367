//! Send path: block list, provider call, failure classification and history.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DeliveryConfig;
use crate::delivery::error_codes::{BLOCKED_NUMBER, Classification};
use crate::delivery::sender::{DeliveryChannel, DeliveryKind, OutboundMessage, SendError, Sender};
use crate::error::DeliveryError;
use crate::model::{HistoryEntry, HistoryKind, Monitoree};
use crate::pipeline::household::active_dependents;
use crate::store::Database;

static NON_DIALABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d+]").expect("valid phone regex"));

/// Strip formatting from a phone number, keeping digits and a leading `+`.
///
/// Ten-digit numbers are assumed to be North American and get `+1`.
pub fn normalize_phone(raw: &str) -> String {
    let stripped = NON_DIALABLE.replace_all(raw.trim(), "");
    let (plus, digits) = match stripped.strip_prefix('+') {
        Some(rest) => (true, rest.replace('+', "")),
        None => (false, stripped.replace('+', "")),
    };
    match (plus, digits.len()) {
        (true, _) => format!("+{digits}"),
        (false, 10) => format!("+1{digits}"),
        (false, 11) if digits.starts_with('1') => format!("+{digits}"),
        _ => digits,
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Destination is on the block list; nothing was sent.
    Blocked,
    /// The provider rejected the message.
    Failed(Classification),
    /// The provider could not be reached; safe to retry.
    Unreachable { reason: String },
}

impl DeliveryOutcome {
    pub fn retry_eligible(&self) -> bool {
        match self {
            Self::Failed(class) => class.retry_eligible,
            Self::Unreachable { .. } => true,
            Self::Delivered | Self::Blocked => false,
        }
    }
}

/// Sends messages to monitorees and keeps their history in step.
pub struct DeliveryDispatcher {
    db: Arc<dyn Database>,
    sender: Arc<dyn Sender>,
    config: DeliveryConfig,
}

impl DeliveryDispatcher {
    pub fn new(db: Arc<dyn Database>, sender: Arc<dyn Sender>, config: DeliveryConfig) -> Self {
        Self { db, sender, config }
    }

    /// Build a report reminder pinned to the jurisdiction's newest threshold definition.
    pub async fn reminder_for(
        &self,
        monitoree_id: Uuid,
        channel: DeliveryChannel,
        body: impl Into<String>,
    ) -> Result<OutboundMessage, DeliveryError> {
        let monitoree = self.load(monitoree_id).await?;
        let threshold_hash = self
            .db
            .latest_threshold_for_jurisdiction(&monitoree.jurisdiction_id)
            .await?
            .map(|t| t.hash);
        if threshold_hash.is_none() {
            warn!(
                monitoree_id = %monitoree.id,
                jurisdiction = %monitoree.jurisdiction_id,
                "No threshold definition for jurisdiction; reminder is unpinned"
            );
        }
        Ok(OutboundMessage {
            monitoree_id,
            channel,
            kind: DeliveryKind::AssessmentReminder,
            body: body.into(),
            threshold_hash,
        })
    }

    /// Send one message and record the result.
    ///
    /// Provider failures are outcomes, not errors; `Err` means storage failed
    /// or the monitoree cannot be addressed at all.
    pub async fn deliver(&self, message: &OutboundMessage) -> Result<DeliveryOutcome, DeliveryError> {
        let target = self.load(message.monitoree_id).await?;
        let address = address_for(&target, message.channel)?;

        if message.channel.uses_phone() && self.db.is_number_blocked(&address).await? {
            info!(
                monitoree_id = %target.id,
                channel = %message.channel,
                "Skipping send to blocked number"
            );
            self.db
                .insert_history(&HistoryEntry::new(
                    target.id,
                    HistoryKind::UnsuccessfulReportReminder,
                    &self.config.history_author,
                    format!(
                        "The system did not send a {} message because {} has blocked communications.",
                        message.channel, address
                    ),
                ))
                .await?;
            return Ok(DeliveryOutcome::Blocked);
        }

        match self.sender.send(&address, message).await {
            Ok(()) => {
                self.record_success(&target, message).await?;
                Ok(DeliveryOutcome::Delivered)
            }
            Err(SendError::Provider { code }) => {
                let class = self.config.error_codes.classify(&code);
                warn!(
                    monitoree_id = %target.id,
                    provider = self.sender.name(),
                    code = %class.code,
                    retry_eligible = class.retry_eligible,
                    "Provider rejected message"
                );
                if message.channel.uses_phone() && code == BLOCKED_NUMBER {
                    let added = self.db.block_number(&address).await?;
                    debug!(monitoree_id = %target.id, added, "Recorded blocked number");
                }
                self.record_failure(&target, message, &class).await?;
                Ok(DeliveryOutcome::Failed(class))
            }
            Err(SendError::Transport(reason)) => {
                warn!(
                    monitoree_id = %target.id,
                    provider = self.sender.name(),
                    error = %reason,
                    "Provider unreachable"
                );
                Ok(DeliveryOutcome::Unreachable { reason })
            }
        }
    }

    async fn load(&self, id: Uuid) -> Result<Monitoree, DeliveryError> {
        self.db
            .get_monitoree(id)
            .await?
            .ok_or_else(|| DeliveryError::UnknownMonitoree { id: id.to_string() })
    }

    async fn record_success(
        &self,
        target: &Monitoree,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        if message.kind != DeliveryKind::AssessmentReminder {
            return Ok(());
        }
        self.db.mark_reminder_sent(target.id, Utc::now()).await?;
        self.db
            .insert_history(&HistoryEntry::new(
                target.id,
                HistoryKind::ReportReminder,
                &self.config.history_author,
                format!("Sent a report reminder by {}.", message.channel),
            ))
            .await?;
        Ok(())
    }

    /// Write the failure to every monitoree who was waiting on this message.
    async fn record_failure(
        &self,
        target: &Monitoree,
        message: &OutboundMessage,
        class: &Classification,
    ) -> Result<usize, DeliveryError> {
        let disposition = if class.retry_eligible {
            "This failure will be retried."
        } else {
            "This failure is terminal and will not be retried."
        };
        let comment = format!(
            "The system was unable to send a {} message. Cause: {}. {disposition}",
            message.channel, class.message
        );
        let recipients = self.failure_recipients(target, message).await?;
        let rows: Vec<HistoryEntry> = recipients
            .iter()
            .map(|id| {
                HistoryEntry::new(
                    *id,
                    HistoryKind::UnsuccessfulReportReminder,
                    &self.config.history_author,
                    comment.clone(),
                )
            })
            .collect();
        self.db.insert_histories(&rows).await?;
        Ok(rows.len())
    }

    async fn failure_recipients(
        &self,
        target: &Monitoree,
        message: &OutboundMessage,
    ) -> Result<Vec<Uuid>, DeliveryError> {
        let household_broadcast = message.kind == DeliveryKind::AssessmentReminder
            && target.is_self_responder()
            && !target.preferred_contact_method.is_weblink();

        if household_broadcast {
            let dependents = active_dependents(self.db.as_ref(), target).await?;
            if !dependents.is_empty() {
                return Ok(std::iter::once(target.id)
                    .chain(dependents.iter().map(|d| d.id))
                    .collect());
            }
        }

        let mut ids = vec![target.id];
        if target.responder_id != target.id {
            ids.push(target.responder_id);
        }
        Ok(ids)
    }
}

fn address_for(target: &Monitoree, channel: DeliveryChannel) -> Result<String, DeliveryError> {
    let address = match channel {
        DeliveryChannel::Sms | DeliveryChannel::Voice => {
            target.primary_telephone.as_deref().map(normalize_phone)
        }
        DeliveryChannel::Email => target.email.clone(),
    };
    address
        .filter(|a| !a.is_empty())
        .ok_or_else(|| DeliveryError::MissingAddress {
            id: target.id.to_string(),
            channel: channel.to_string(),
        })
}
