//! Turns an inbound message into a reported condition.

use serde_json::Value;

use crate::error::IntakeError;
use crate::model::{Condition, SymptomValue, ThresholdDefinition, decode_symptoms};

/// Yes/no answer from a channel that does not carry per-symptom values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymptomIntent {
    Experiencing,
    NotExperiencing,
}

impl SymptomIntent {
    /// A missing flag is read as "not experiencing".
    pub fn from_flag(flag: Option<bool>) -> Self {
        if flag.unwrap_or(false) {
            Self::Experiencing
        } else {
            Self::NotExperiencing
        }
    }
}

/// Condition carrying the symptoms exactly as reported, pinned to `hash`.
pub fn explicit_condition(hash: &str, raw: Vec<Value>) -> Result<Condition, IntakeError> {
    Ok(Condition::new(hash, decode_symptoms(raw)?))
}

/// Condition derived from the pinned schema and a yes/no answer.
///
/// "Yes" leaves every symptom unset. "No" sets each boolean symptom to the
/// opposite of its trigger value; booleans without a trigger value and all
/// numeric symptoms stay unset.
pub fn infer_condition(threshold: &ThresholdDefinition, intent: SymptomIntent) -> Condition {
    let symptoms = threshold
        .symptoms
        .iter()
        .map(|schema| {
            let value = match (intent, schema.value) {
                (SymptomIntent::NotExperiencing, SymptomValue::Bool(Some(trigger))) => {
                    SymptomValue::Bool(Some(!trigger))
                }
                (_, value) => SymptomValue::unset(value.kind()),
            };
            schema.to_symptom(value)
        })
        .collect();
    Condition::new(threshold.hash.clone(), symptoms)
}
