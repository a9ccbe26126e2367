//! Monitoree data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a monitoree prefers to be contacted for daily reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMethod {
    /// Link to the web assessment sent by e-mail.
    EmailedWebLink,
    /// Link to the web assessment sent by SMS.
    SmsTextedWebLink,
    /// Yes/no questionnaire over SMS.
    SmsText,
    /// Automated voice call.
    Telephone,
    /// Opted out of automated contact.
    OptOut,
    #[default]
    Unknown,
}

impl ContactMethod {
    /// Web-link preferences deliver a per-person link rather than a household broadcast.
    pub fn is_weblink(self) -> bool {
        matches!(self, Self::EmailedWebLink | Self::SmsTextedWebLink)
    }
}

impl std::fmt::Display for ContactMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmailedWebLink => write!(f, "emailed_web_link"),
            Self::SmsTextedWebLink => write!(f, "sms_texted_web_link"),
            Self::SmsText => write!(f, "sms_text"),
            Self::Telephone => write!(f, "telephone"),
            Self::OptOut => write!(f, "opt_out"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for ContactMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emailed_web_link" => Ok(Self::EmailedWebLink),
            "sms_texted_web_link" => Ok(Self::SmsTextedWebLink),
            "sms_text" => Ok(Self::SmsText),
            "telephone" => Ok(Self::Telephone),
            "opt_out" => Ok(Self::OptOut),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Unknown contact method: {}", s)),
        }
    }
}

/// A person under monitoring.
///
/// `responder_id` points at the household member who answers for this
/// monitoree. A head of household responds for themself, so their
/// `responder_id` equals their own `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitoree {
    pub id: Uuid,
    pub responder_id: Uuid,
    pub jurisdiction_id: String,
    /// Opaque, rotatable token carried by report links and reply messages.
    pub submission_token: String,
    pub primary_telephone: Option<String>,
    pub email: Option<String>,
    pub preferred_contact_method: ContactMethod,
    /// Still under active monitoring.
    pub monitoring: bool,
    /// Record has been purged; never resolved by the pipeline.
    pub purged: bool,
    pub last_assessment_reminder_sent: Option<DateTime<Utc>>,
    pub latest_assessment: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Monitoree {
    /// Create a self-responding monitoree (their own head of household).
    pub fn new(jurisdiction_id: impl Into<String>, submission_token: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            responder_id: id,
            jurisdiction_id: jurisdiction_id.into(),
            submission_token: submission_token.into(),
            primary_telephone: None,
            email: None,
            preferred_contact_method: ContactMethod::Unknown,
            monitoring: true,
            purged: false,
            last_assessment_reminder_sent: None,
            latest_assessment: None,
            created_at: Utc::now(),
        }
    }

    /// Create a dependent whose reports are answered by `head`.
    pub fn dependent_of(head: &Monitoree, submission_token: impl Into<String>) -> Self {
        Self {
            responder_id: head.id,
            primary_telephone: head.primary_telephone.clone(),
            preferred_contact_method: head.preferred_contact_method,
            ..Self::new(head.jurisdiction_id.clone(), submission_token)
        }
    }

    /// Builder: set the primary telephone number.
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.primary_telephone = Some(phone.into());
        self
    }

    /// Builder: set the e-mail address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Builder: set the preferred contact method.
    pub fn with_contact_method(mut self, method: ContactMethod) -> Self {
        self.preferred_contact_method = method;
        self
    }

    /// Builder: mark as no longer monitored.
    pub fn closed(mut self) -> Self {
        self.monitoring = false;
        self
    }

    /// Whether this monitoree answers for themself.
    pub fn is_self_responder(&self) -> bool {
        self.responder_id == self.id
    }

    /// Monitored and not purged.
    pub fn is_actively_monitored(&self) -> bool {
        self.monitoring && !self.purged
    }

    /// Phone number as written into history comments.
    pub fn phone_display(&self) -> &str {
        self.primary_telephone.as_deref().unwrap_or("an unknown number")
    }
}
