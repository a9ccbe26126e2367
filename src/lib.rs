//! Assessment intake: turns queued symptom self-reports into stored reports.

pub mod config;
pub mod delivery;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod store;
