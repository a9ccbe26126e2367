//! Outbound messaging seam.

use async_trait::async_trait;
use uuid::Uuid;

/// Medium an outbound message travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryChannel {
    Sms,
    Voice,
    Email,
}

impl DeliveryChannel {
    /// Addressed by phone number.
    pub fn uses_phone(self) -> bool {
        matches!(self, Self::Sms | Self::Voice)
    }
}

impl std::fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sms => write!(f, "sms"),
            Self::Voice => write!(f, "voice"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// What the message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    /// Daily report reminder; answered once for the whole household.
    AssessmentReminder,
    /// Any other one-off message.
    Single,
}

/// A message ready to send to one monitoree.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub monitoree_id: Uuid,
    pub channel: DeliveryChannel,
    pub kind: DeliveryKind,
    pub body: String,
    /// Threshold definition the reply should be pinned to.
    pub threshold_hash: Option<String>,
}

/// Send failures surfaced by a `Sender`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The provider rejected the message with an error code.
    #[error("Provider rejected message with code {code}")]
    Provider { code: String },

    /// The provider could not be reached.
    #[error("Transport failure: {0}")]
    Transport(String),
}

/// Messaging provider. Implementations only transmit; classification and
/// history are handled by the dispatcher.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Transmit `message` to `address` (a normalised phone number or e-mail address).
    async fn send(&self, address: &str, message: &OutboundMessage) -> Result<(), SendError>;
}
