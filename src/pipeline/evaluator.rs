//! Symptomatic evaluation against a pinned threshold definition.

use crate::model::{Condition, ThresholdDefinition};

/// Whether any reported symptom meets its trigger in `threshold`.
///
/// Symptoms absent from the schema, unset values and kind mismatches never trigger.
pub fn condition_meets_threshold(condition: &Condition, threshold: &ThresholdDefinition) -> bool {
    condition.symptoms.iter().any(|reported| {
        threshold
            .symptom(&reported.name)
            .is_some_and(|schema| schema.triggered_by(&reported.value))
    })
}

/// Symptomatic when the condition meets the threshold or the sender says so.
pub fn is_symptomatic(
    condition: &Condition,
    threshold: &ThresholdDefinition,
    experiencing_symptoms: Option<bool>,
) -> bool {
    condition_meets_threshold(condition, threshold) || experiencing_symptoms.unwrap_or(false)
}
