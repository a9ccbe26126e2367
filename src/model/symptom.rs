//! Typed symptom values and their JSON wire form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IntakeError;
use crate::model::threshold::ThresholdOperator;

/// The value type of a symptom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymptomKind {
    #[serde(rename = "bool", alias = "BoolSymptom", alias = "boolean")]
    Bool,
    #[serde(rename = "integer", alias = "IntegerSymptom", alias = "int")]
    Integer,
    #[serde(rename = "float", alias = "FloatSymptom")]
    Float,
}

impl std::fmt::Display for SymptomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
        }
    }
}

/// A symptom value; `None` means "unset".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SymptomValue {
    Bool(Option<bool>),
    Integer(Option<i64>),
    Float(Option<f64>),
}

impl SymptomValue {
    /// An unset value of the given kind.
    pub fn unset(kind: SymptomKind) -> Self {
        match kind {
            SymptomKind::Bool => Self::Bool(None),
            SymptomKind::Integer => Self::Integer(None),
            SymptomKind::Float => Self::Float(None),
        }
    }

    pub fn kind(&self) -> SymptomKind {
        match self {
            Self::Bool(_) => SymptomKind::Bool,
            Self::Integer(_) => SymptomKind::Integer,
            Self::Float(_) => SymptomKind::Float,
        }
    }

    pub fn is_set(&self) -> bool {
        match self {
            Self::Bool(v) => v.is_some(),
            Self::Integer(v) => v.is_some(),
            Self::Float(v) => v.is_some(),
        }
    }

    /// Decode a JSON value for a symptom of `kind`. `null` decodes to unset.
    fn from_json(kind: SymptomKind, value: &Value) -> Result<Self, String> {
        if value.is_null() {
            return Ok(Self::unset(kind));
        }
        match kind {
            SymptomKind::Bool => value
                .as_bool()
                .map(|b| Self::Bool(Some(b)))
                .ok_or_else(|| "expected a boolean".to_string()),
            SymptomKind::Integer => value
                .as_i64()
                .map(|n| Self::Integer(Some(n)))
                .ok_or_else(|| "expected a whole number".to_string()),
            SymptomKind::Float => value
                .as_f64()
                .map(|n| Self::Float(Some(n)))
                .ok_or_else(|| "expected a number".to_string()),
        }
    }

    fn to_json(self) -> Value {
        match self {
            Self::Bool(v) => v.map(Value::Bool).unwrap_or(Value::Null),
            Self::Integer(v) => v.map(Value::from).unwrap_or(Value::Null),
            Self::Float(v) => v
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

/// A named symptom carrying a typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SymptomRecord", into = "SymptomRecord")]
pub struct Symptom {
    pub name: String,
    pub label: String,
    pub value: SymptomValue,
}

impl Symptom {
    pub fn new(name: impl Into<String>, label: impl Into<String>, value: SymptomValue) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            value,
        }
    }

    pub fn kind(&self) -> SymptomKind {
        self.value.kind()
    }
}

/// JSON shape shared by reported and threshold symptoms:
/// `{"name", "label"?, "type", "value"?, "threshold_operator"?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub kind: SymptomKind,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_operator: Option<ThresholdOperator>,
}

impl SymptomRecord {
    /// Split into (name, label, typed value), defaulting the label to the name.
    pub(crate) fn decode(self) -> Result<(String, String, SymptomValue), IntakeError> {
        let value = SymptomValue::from_json(self.kind, &self.value).map_err(|reason| {
            IntakeError::InvalidSymptom {
                name: self.name.clone(),
                reason,
            }
        })?;
        let label = self.label.unwrap_or_else(|| self.name.clone());
        Ok((self.name, label, value))
    }

    pub(crate) fn encode(
        name: String,
        label: String,
        value: SymptomValue,
        threshold_operator: Option<ThresholdOperator>,
    ) -> Self {
        Self {
            name,
            label: Some(label),
            kind: value.kind(),
            value: value.to_json(),
            threshold_operator,
        }
    }
}

impl TryFrom<SymptomRecord> for Symptom {
    type Error = IntakeError;

    fn try_from(record: SymptomRecord) -> Result<Self, Self::Error> {
        let (name, label, value) = record.decode()?;
        Ok(Self { name, label, value })
    }
}

impl From<Symptom> for SymptomRecord {
    fn from(symptom: Symptom) -> Self {
        SymptomRecord::encode(symptom.name, symptom.label, symptom.value, None)
    }
}

/// Decode an explicit `reported_symptoms_array` into typed symptoms.
pub fn decode_symptoms(raw: Vec<Value>) -> Result<Vec<Symptom>, IntakeError> {
    raw.into_iter()
        .map(|item| {
            let record: SymptomRecord =
                serde_json::from_value(item).map_err(|e| IntakeError::InvalidSymptom {
                    name: "<unnamed>".into(),
                    reason: e.to_string(),
                })?;
            Symptom::try_from(record)
        })
        .collect()
}
