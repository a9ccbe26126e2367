//! Household fan-out for yes/no replies.
//!
//! A head of household answers once for everyone they respond for, so an
//! inferred condition is recorded on every actively monitored member.

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{Condition, Monitoree, Report, WhoReported};
use crate::store::Database;

/// Every active member of the monitoree's household, the monitoree first.
///
/// The household is keyed on `responder_id`, so a dependent's token reaches
/// the head and the other dependents too.
pub async fn active_members(
    db: &dyn Database,
    monitoree: &Monitoree,
) -> Result<Vec<Monitoree>, DatabaseError> {
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut members = Vec::new();

    if monitoree.is_actively_monitored() {
        seen.insert(monitoree.id);
        members.push(monitoree.clone());
    }
    for member in db.list_active_household(monitoree.responder_id).await? {
        if seen.insert(member.id) {
            members.push(member);
        }
    }

    Ok(members)
}

/// Active members other than the monitoree itself.
pub async fn active_dependents(
    db: &dyn Database,
    monitoree: &Monitoree,
) -> Result<Vec<Monitoree>, DatabaseError> {
    Ok(db
        .list_active_household(monitoree.id)
        .await?
        .into_iter()
        .filter(|m| m.id != monitoree.id)
        .collect())
}

/// `Monitoree` when the member's own token carried the message, otherwise `Proxy`.
pub fn attribution(member: &Monitoree, inbound_token: &str) -> WhoReported {
    if member.submission_token == inbound_token {
        WhoReported::Monitoree
    } else {
        WhoReported::Proxy
    }
}

/// One report per member, each carrying its own copy of `condition`.
pub fn fan_out(
    members: &[Monitoree],
    condition: &Condition,
    symptomatic: bool,
    inbound_token: &str,
) -> Vec<Report> {
    members
        .iter()
        .map(|member| {
            let who = attribution(member, inbound_token);
            debug!(monitoree_id = %member.id, who_reported = %who, "Fanning out report");
            Report::new(member.id, condition.clone(), symptomatic, who)
        })
        .collect()
}
