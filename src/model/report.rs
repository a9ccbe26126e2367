//! Reports and the conditions they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::symptom::Symptom;

/// A concrete set of symptom values pinned to one threshold definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub threshold_hash: String,
    pub symptoms: Vec<Symptom>,
}

impl Condition {
    pub fn new(threshold_hash: impl Into<String>, symptoms: Vec<Symptom>) -> Self {
        Self {
            threshold_hash: threshold_hash.into(),
            symptoms,
        }
    }

    pub fn symptom(&self, name: &str) -> Option<&Symptom> {
        self.symptoms.iter().find(|s| s.name == name)
    }
}

/// Who submitted a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhoReported {
    /// The monitoree reported for themself.
    Monitoree,
    /// Someone else in the household reported on their behalf.
    Proxy,
}

impl std::fmt::Display for WhoReported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monitoree => write!(f, "Monitoree"),
            Self::Proxy => write!(f, "Proxy"),
        }
    }
}

impl std::str::FromStr for WhoReported {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Monitoree" => Ok(Self::Monitoree),
            "Proxy" => Ok(Self::Proxy),
            _ => Err(format!("Unknown reporter: {}", s)),
        }
    }
}

/// A symptom report recorded on a monitoree. Create-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub monitoree_id: Uuid,
    pub condition: Condition,
    pub symptomatic: bool,
    pub who_reported: WhoReported,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn new(
        monitoree_id: Uuid,
        condition: Condition,
        symptomatic: bool,
        who_reported: WhoReported,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            monitoree_id,
            condition,
            symptomatic,
            who_reported,
            created_at: Utc::now(),
        }
    }
}
