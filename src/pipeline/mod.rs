//! Assessment ingestion pipeline.
//!
//! Every queued message flows through:
//! 1. `resolver`: submission token → monitoree
//! 2. `dedup`: cooldown gate
//! 3. `contact_attempt`: delivery-status short-circuit
//! 4. `materializer` + `evaluator`: condition and symptomatic flag
//! 5. `household`: fan-out for yes/no replies
//!
//! `processor::AssessmentProcessor` wires the stages; `consumer` runs it over a queue.

pub mod consumer;
pub mod contact_attempt;
pub mod dedup;
pub mod evaluator;
pub mod household;
pub mod materializer;
pub mod processor;
pub mod resolver;
pub mod types;

pub use consumer::{ConsumerSummary, spawn_consumer};
pub use processor::AssessmentProcessor;
pub use types::{AssessmentMessage, IntakeOutcome, ResponseStatus};
