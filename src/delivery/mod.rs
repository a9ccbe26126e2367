//! Outbound delivery: sending reminders and classifying failed sends.

pub mod dispatcher;
pub mod error_codes;
pub mod sender;

pub use dispatcher::{DeliveryDispatcher, DeliveryOutcome, normalize_phone};
pub use error_codes::{Classification, ErrorCodeTable};
pub use sender::{DeliveryChannel, DeliveryKind, OutboundMessage, SendError, Sender};
