//! Records delivery-status signals as contact-attempt history.

use tracing::info;

use crate::error::DatabaseError;
use crate::model::{HistoryEntry, HistoryKind, Monitoree};
use crate::pipeline::household::active_dependents;
use crate::pipeline::types::ResponseStatus;
use crate::store::Database;

/// Comment written on the monitoree the message resolved to.
pub fn monitoree_comment(status: ResponseStatus, phone: &str) -> String {
    match status {
        ResponseStatus::NoAnswerVoice => format!(
            "The system could not record a response because the monitoree did not answer a telephone call to {phone}."
        ),
        ResponseStatus::NoAnswerSms => format!(
            "The system could not record a response because the monitoree did not reply to an SMS message sent to {phone}."
        ),
        ResponseStatus::ErrorVoice => {
            format!("The system was unable to complete a telephone call to {phone}.")
        }
        ResponseStatus::ErrorSms => {
            format!("The system was unable to send an SMS message to {phone}.")
        }
    }
}

/// Comment written on each dependent of that monitoree.
pub fn dependent_comment(status: ResponseStatus, phone: &str) -> String {
    match status {
        ResponseStatus::NoAnswerVoice => format!(
            "The system could not record a response for this household member because their head of household did not answer a telephone call to {phone}."
        ),
        ResponseStatus::NoAnswerSms => format!(
            "The system could not record a response for this household member because their head of household did not reply to an SMS message sent to {phone}."
        ),
        ResponseStatus::ErrorVoice => format!(
            "The system was unable to complete a telephone call to this household member's head of household at {phone}."
        ),
        ResponseStatus::ErrorSms => format!(
            "The system was unable to send an SMS message to this household member's head of household at {phone}."
        ),
    }
}

/// Voice outcomes reopen the reminder slot so the scheduler calls again.
pub fn clears_reminder(status: ResponseStatus) -> bool {
    match status {
        ResponseStatus::NoAnswerVoice | ResponseStatus::ErrorVoice => true,
        ResponseStatus::NoAnswerSms | ResponseStatus::ErrorSms => false,
    }
}

/// Write contact-attempt history for `monitoree` and its active dependents.
///
/// Dependent rows go out in one batched insert. Returns the number of dependents written.
pub async fn record_contact_attempt(
    db: &dyn Database,
    monitoree: &Monitoree,
    status: ResponseStatus,
    author: &str,
) -> Result<usize, DatabaseError> {
    let phone = monitoree.phone_display();

    if clears_reminder(status) {
        db.clear_last_reminder_sent(monitoree.id).await?;
    }

    db.insert_history(&HistoryEntry::new(
        monitoree.id,
        HistoryKind::ContactAttempt,
        author,
        monitoree_comment(status, phone),
    ))
    .await?;

    let dependents = active_dependents(db, monitoree).await?;
    if !dependents.is_empty() {
        let comment = dependent_comment(status, phone);
        let rows: Vec<HistoryEntry> = dependents
            .iter()
            .map(|dep| HistoryEntry::new(dep.id, HistoryKind::ContactAttempt, author, comment.clone()))
            .collect();
        db.insert_histories(&rows).await?;
    }

    info!(
        monitoree_id = %monitoree.id,
        status = status.label(),
        dependents = dependents.len(),
        "Recorded contact attempt"
    );
    Ok(dependents.len())
}
