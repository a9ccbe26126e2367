//! Error types for the assessment intake worker.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures inside the ingestion pipeline.
///
/// These never escape `AssessmentProcessor::consume`; they are logged and
/// folded into an `IntakeOutcome`.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Storage failure: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Invalid symptom {name}: {reason}")]
    InvalidSymptom { name: String, reason: String },
}

/// Send-path errors that are not provider delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Storage failure: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Monitoree {id} not found")]
    UnknownMonitoree { id: String },

    #[error("Monitoree {id} has no {channel} address on file")]
    MissingAddress { id: String, channel: String },
}
