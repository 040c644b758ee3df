//! Email model representing one synchronized Gmail message

use super::RiskTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message on the provider side (Gmail message ID)
///
/// Uniqueness is per user: the same Gmail ID can legitimately appear for two
/// different users, so lookups always pair it with a user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GmailId(pub String);

impl GmailId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for GmailId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GmailId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for GmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classification category assigned to an email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Personal,
    Promotional,
    Spam,
    Newsletter,
    Social,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Work => "work",
            Category::Personal => "personal",
            Category::Promotional => "promotional",
            Category::Spam => "spam",
            Category::Newsletter => "newsletter",
            Category::Social => "social",
            Category::Unknown => "unknown",
        }
    }

    /// Parse a category name, case-insensitively. Unrecognized names map to
    /// `Unknown` rather than failing.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" => Category::Work,
            "personal" => Category::Personal,
            "promotional" => Category::Promotional,
            "spam" => Category::Spam,
            "newsletter" => Category::Newsletter,
            "social" => Category::Social,
            _ => Category::Unknown,
        }
    }
}

/// The classification outcome applied to an email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    /// Model confidence, 0-1
    pub confidence: f32,
    pub is_spam: bool,
    /// Rule-based spam score, 0-1
    pub spam_score: f32,
    pub spam_reason: Option<String>,
    pub sender_risk: RiskTier,
}

impl Classification {
    /// Copy the classification onto an email record and mark it processed
    pub fn apply_to(&self, email: &mut EmailRecord) {
        email.category = Some(self.category);
        email.confidence = Some(self.confidence);
        email.is_spam = self.is_spam;
        email.spam_score = Some(self.spam_score);
        email.spam_reason = self.spam_reason.clone();
        email.sender_risk = Some(self.sender_risk);
        email.is_processed = true;
    }
}

/// One synchronized email message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Unique integer identifier (database primary key, 0 until stored)
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Gmail message ID, unique per user
    pub gmail_id: GmailId,
    /// Gmail thread ID
    pub thread_id: Option<String>,
    /// Subject line
    pub subject: String,
    /// Sender address as it appeared in the From header
    pub sender: String,
    /// Recipient address from the To header
    pub recipient: String,
    /// Provider-supplied preview text
    pub snippet: String,
    /// Full body content; may be cleared later by maintenance cleanup
    pub body: Option<String>,
    /// When the message was received
    pub received_at: DateTime<Utc>,
    /// Gmail label IDs, in provider order
    pub labels: Vec<String>,
    /// Classification category, once classified
    pub category: Option<Category>,
    /// Classifier confidence 0-1
    pub confidence: Option<f32>,
    /// Whether the message is considered spam
    pub is_spam: bool,
    /// Rule-based spam score 0-1
    pub spam_score: Option<f32>,
    /// Human-readable reason when flagged as spam
    pub spam_reason: Option<String>,
    /// Risk tier of the sending address
    pub sender_risk: Option<RiskTier>,
    /// Whether classification has run for this message
    pub is_processed: bool,
    /// Soft-delete flag (provider-side TRASH move, row retained)
    pub is_deleted: bool,
    /// Archive flag (provider-side INBOX removal)
    pub is_archived: bool,
    /// When the local record was created
    pub created_at: DateTime<Utc>,
}

impl EmailRecord {
    /// Create a new email record builder
    pub fn builder(user_id: i64, gmail_id: GmailId) -> EmailRecordBuilder {
        EmailRecordBuilder::new(user_id, gmail_id)
    }

    /// Bare sender address with any display name stripped
    /// ("Jane <jane@example.com>" -> "jane@example.com")
    pub fn sender_address(&self) -> &str {
        let s = self.sender.trim();
        if let Some(start) = s.rfind('<')
            && let Some(end) = s.rfind('>')
            && start < end
        {
            return s[start + 1..end].trim();
        }
        s
    }
}

/// Builder for creating EmailRecord instances
pub struct EmailRecordBuilder {
    record: EmailRecord,
}

impl EmailRecordBuilder {
    fn new(user_id: i64, gmail_id: GmailId) -> Self {
        Self {
            record: EmailRecord {
                id: 0,
                user_id,
                gmail_id,
                thread_id: None,
                subject: String::new(),
                sender: String::new(),
                recipient: String::new(),
                snippet: String::new(),
                body: None,
                received_at: Utc::now(),
                labels: Vec::new(),
                category: None,
                confidence: None,
                is_spam: false,
                spam_score: None,
                spam_reason: None,
                sender_risk: None,
                is_processed: false,
                is_deleted: false,
                is_archived: false,
                created_at: Utc::now(),
            },
        }
    }

    pub fn thread_id(mut self, thread_id: Option<String>) -> Self {
        self.record.thread_id = thread_id;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.record.subject = subject.into();
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.record.sender = sender.into();
        self
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.record.recipient = recipient.into();
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.record.snippet = snippet.into();
        self
    }

    pub fn body(mut self, body: Option<String>) -> Self {
        self.record.body = body;
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.record.received_at = received_at;
        self
    }

    pub fn labels(mut self, labels: Vec<String>) -> Self {
        self.record.labels = labels;
        self
    }

    pub fn build(self) -> EmailRecord {
        self.record
    }
}
