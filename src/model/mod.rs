//! Domain model: monitorees, symptom schemas, reports and history.

pub mod history;
pub mod monitoree;
pub mod report;
pub mod symptom;
pub mod threshold;

pub use history::{HistoryEntry, HistoryKind};
pub use monitoree::{ContactMethod, Monitoree};
pub use report::{Condition, Report, WhoReported};
pub use symptom::{Symptom, SymptomKind, SymptomValue, decode_symptoms};
pub use threshold::{ThresholdDefinition, ThresholdOperator, ThresholdSymptom};

/// Author recorded on history rows written by the worker itself.
pub const SYSTEM_AUTHOR: &str = "Monitoring System";
