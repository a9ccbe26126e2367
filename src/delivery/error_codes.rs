//! Provider error codes and how failed sends are classified.

use std::collections::HashMap;

/// Recipient has replied STOP; the number goes on the block list.
pub const BLOCKED_NUMBER: &str = "21610";

/// Handset unreachable; the only code worth retrying.
pub const UNREACHABLE_HANDSET: &str = "30003";

/// How one provider error code is treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub code: String,
    /// Human-readable cause written into history.
    pub message: String,
    pub retry_eligible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    message: String,
    retry_eligible: bool,
}

/// Lookup table from provider error code to classification.
#[derive(Debug, Clone, Default)]
pub struct ErrorCodeTable {
    entries: HashMap<String, Entry>,
}

impl ErrorCodeTable {
    /// Table with no known codes; everything classifies as a terminal unknown failure.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Codes the messaging provider is known to return.
    pub fn builtin() -> Self {
        Self::empty()
            .with_code(BLOCKED_NUMBER, "Recipient has opted out of messages from this number", false)
            .with_code(UNREACHABLE_HANDSET, "Recipient handset is unreachable", true)
            .with_code("30004", "Message blocked by the carrier or recipient", false)
            .with_code("30005", "Recipient number is unknown or no longer exists", false)
            .with_code("30006", "Recipient number is a landline or unreachable carrier", false)
            .with_code("30007", "Message was filtered as spam by the carrier", false)
            .with_code("30008", "Message delivery failed for an unknown reason", false)
            .with_code("21211", "Recipient number is not a valid phone number", false)
            .with_code("21612", "Recipient number is not reachable by this sender", false)
            .with_code("21614", "Recipient number is not a mobile number", false)
            .with_code("32017", "Call was blocked by the carrier", false)
            .with_code("13224", "Recipient number is not a valid voice number", false)
    }

    /// Builder: add or replace one code.
    pub fn with_code(
        mut self,
        code: impl Into<String>,
        message: impl Into<String>,
        retry_eligible: bool,
    ) -> Self {
        self.entries.insert(
            code.into(),
            Entry {
                message: message.into(),
                retry_eligible,
            },
        );
        self
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Classify a provider error code. Unknown codes are terminal.
    pub fn classify(&self, code: &str) -> Classification {
        match self.entries.get(code) {
            Some(entry) => Classification {
                code: code.to_string(),
                message: entry.message.clone(),
                retry_eligible: entry.retry_eligible,
            },
            None => Classification {
                code: code.to_string(),
                message: format!("Provider returned unrecognised error code {code}"),
                retry_eligible: false,
            },
        }
    }
}
