//! Content-addressed symptom schemas.
//!
//! A definition's hash is derived from its jurisdiction and ordered symptom
//! schema. Changing any symptom yields a new hash and therefore a new
//! definition; stored definitions are never edited in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IntakeError;
use crate::model::symptom::{Symptom, SymptomRecord, SymptomValue};

/// Comparison applied between a reported numeric value and its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOperator {
    #[serde(alias = "Less Than")]
    LessThan,
    #[serde(alias = "Less Than Or Equal")]
    LessThanOrEqual,
    #[serde(alias = "Greater Than")]
    GreaterThan,
    #[default]
    #[serde(alias = "Greater Than Or Equal")]
    GreaterThanOrEqual,
    #[serde(alias = "Equal")]
    Equal,
    #[serde(alias = "Not Equal")]
    NotEqual,
}

impl ThresholdOperator {
    /// Whether `reported` triggers against `threshold`.
    pub fn fires<T: PartialOrd>(self, reported: T, threshold: T) -> bool {
        match self {
            Self::LessThan => reported < threshold,
            Self::LessThanOrEqual => reported <= threshold,
            Self::GreaterThan => reported > threshold,
            Self::GreaterThanOrEqual => reported >= threshold,
            Self::Equal => reported == threshold,
            Self::NotEqual => reported != threshold,
        }
    }
}

impl std::fmt::Display for ThresholdOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LessThan => write!(f, "less_than"),
            Self::LessThanOrEqual => write!(f, "less_than_or_equal"),
            Self::GreaterThan => write!(f, "greater_than"),
            Self::GreaterThanOrEqual => write!(f, "greater_than_or_equal"),
            Self::Equal => write!(f, "equal"),
            Self::NotEqual => write!(f, "not_equal"),
        }
    }
}

/// One symptom of a schema, with the value that triggers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SymptomRecord", into = "SymptomRecord")]
pub struct ThresholdSymptom {
    pub name: String,
    pub label: String,
    /// Trigger value. Booleans trigger on equality, numbers via `operator`.
    pub value: SymptomValue,
    pub operator: ThresholdOperator,
}

impl ThresholdSymptom {
    pub fn new(name: impl Into<String>, label: impl Into<String>, value: SymptomValue) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            value,
            operator: ThresholdOperator::default(),
        }
    }

    /// Builder: set the comparison operator.
    pub fn with_operator(mut self, operator: ThresholdOperator) -> Self {
        self.operator = operator;
        self
    }

    /// A reported symptom carrying `value` under this symptom's name and label.
    pub fn to_symptom(&self, value: SymptomValue) -> Symptom {
        Symptom::new(self.name.clone(), self.label.clone(), value)
    }

    /// Whether a reported value of the same kind triggers this symptom.
    pub fn triggered_by(&self, reported: &SymptomValue) -> bool {
        match (reported, &self.value) {
            (SymptomValue::Bool(Some(r)), SymptomValue::Bool(Some(t))) => r == t,
            (SymptomValue::Integer(Some(r)), SymptomValue::Integer(Some(t))) => {
                self.operator.fires(*r, *t)
            }
            (SymptomValue::Float(Some(r)), SymptomValue::Float(Some(t))) => {
                self.operator.fires(*r, *t)
            }
            _ => false,
        }
    }
}

impl TryFrom<SymptomRecord> for ThresholdSymptom {
    type Error = IntakeError;

    fn try_from(record: SymptomRecord) -> Result<Self, Self::Error> {
        let operator = record.threshold_operator.unwrap_or_default();
        let (name, label, value) = record.decode()?;
        Ok(Self {
            name,
            label,
            value,
            operator,
        })
    }
}

impl From<ThresholdSymptom> for SymptomRecord {
    fn from(symptom: ThresholdSymptom) -> Self {
        SymptomRecord::encode(
            symptom.name,
            symptom.label,
            symptom.value,
            Some(symptom.operator),
        )
    }
}

/// A jurisdiction's symptom schema, identified by its content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdDefinition {
    pub hash: String,
    pub jurisdiction_id: String,
    pub symptoms: Vec<ThresholdSymptom>,
    pub created_at: DateTime<Utc>,
}

impl ThresholdDefinition {
    /// Build a definition, deriving its hash from the content.
    pub fn new(jurisdiction_id: impl Into<String>, symptoms: Vec<ThresholdSymptom>) -> Self {
        let jurisdiction_id = jurisdiction_id.into();
        let hash = content_hash(&jurisdiction_id, &symptoms);
        Self {
            hash,
            jurisdiction_id,
            symptoms,
            created_at: Utc::now(),
        }
    }

    /// Look up a schema symptom by name.
    pub fn symptom(&self, name: &str) -> Option<&ThresholdSymptom> {
        self.symptoms.iter().find(|s| s.name == name)
    }
}

/// SHA-256 over a canonical line-per-symptom rendering, as lowercase hex.
pub fn content_hash(jurisdiction_id: &str, symptoms: &[ThresholdSymptom]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(jurisdiction_id.as_bytes());
    hasher.update(b"\n");
    for symptom in symptoms {
        let value = match symptom.value {
            SymptomValue::Bool(v) => format!("{v:?}"),
            SymptomValue::Integer(v) => format!("{v:?}"),
            SymptomValue::Float(v) => format!("{:?}", v.map(f64::to_bits)),
        };
        let line = format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\n",
            symptom.name,
            symptom.label,
            symptom.value.kind(),
            value,
            symptom.operator
        );
        hasher.update(line.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
