//! Sender trust flags and rolling statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of trust judgement recorded for a sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagKind {
    Whitelist,
    Blacklist,
    Spam,
}

/// Risk tier derived from a sender's spam history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Derive the tier from a spam ratio
    pub fn from_ratio(ratio: f32) -> Self {
        if ratio > 0.8 {
            RiskTier::High
        } else if ratio > 0.4 {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(RiskTier::Low),
            "medium" => Some(RiskTier::Medium),
            "high" => Some(RiskTier::High),
            _ => None,
        }
    }
}

impl FlagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKind::Whitelist => "whitelist",
            FlagKind::Blacklist => "blacklist",
            FlagKind::Spam => "spam",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "whitelist" => Some(FlagKind::Whitelist),
            "blacklist" => Some(FlagKind::Blacklist),
            "spam" => Some(FlagKind::Spam),
            _ => None,
        }
    }
}

/// A user's trust judgement about a sending address, with rolling statistics
///
/// At most one flag exists per (user, sender) pair; writes are upserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderFlag {
    /// Unique integer identifier (database primary key, 0 until stored)
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Sending address this flag applies to
    pub sender: String,
    /// Kind of flag
    pub kind: FlagKind,
    /// Current risk tier
    pub risk: RiskTier,
    /// Confidence in the flag, 0-1
    pub confidence: f32,
    /// Total emails observed from this sender
    pub total_emails: u32,
    /// How many of those were spam
    pub spam_emails: u32,
    /// spam_emails / total_emails
    pub spam_ratio: f32,
    /// Earliest observed message from this sender
    pub first_seen: Option<DateTime<Utc>>,
    /// Latest observed message from this sender
    pub last_seen: Option<DateTime<Utc>>,
    /// When the flag row was created
    pub flagged_at: DateTime<Utc>,
    /// Whether the user manually confirmed this flag
    pub user_confirmed: bool,
}

impl SenderFlag {
    /// Create a fresh flag for a sender with no observations yet
    pub fn new(user_id: i64, sender: impl Into<String>, kind: FlagKind) -> Self {
        Self {
            id: 0,
            user_id,
            sender: sender.into(),
            kind,
            risk: RiskTier::Low,
            confidence: 0.0,
            total_emails: 0,
            spam_emails: 0,
            spam_ratio: 0.0,
            first_seen: None,
            last_seen: None,
            flagged_at: Utc::now(),
            user_confirmed: false,
        }
    }

    /// Fold one observed message into the rolling statistics.
    ///
    /// Updates totals, the spam ratio, the derived risk tier, and the
    /// first/last seen window. Confidence grows with the sample size.
    pub fn record_observation(&mut self, is_spam: bool, received_at: DateTime<Utc>) {
        self.total_emails += 1;
        if is_spam {
            self.spam_emails += 1;
        }
        self.spam_ratio = self.spam_emails as f32 / self.total_emails as f32;
        self.risk = RiskTier::from_ratio(self.spam_ratio);
        self.confidence = (self.total_emails as f32 / 10.0).min(1.0);

        match self.first_seen {
            Some(first) if first <= received_at => {}
            _ => self.first_seen = Some(received_at),
        }
        match self.last_seen {
            Some(last) if last >= received_at => {}
            _ => self.last_seen = Some(received_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_risk_from_ratio() {
        assert_eq!(RiskTier::from_ratio(0.0), RiskTier::Low);
        assert_eq!(RiskTier::from_ratio(0.4), RiskTier::Low);
        assert_eq!(RiskTier::from_ratio(0.5), RiskTier::Medium);
        assert_eq!(RiskTier::from_ratio(0.8), RiskTier::Medium);
        assert_eq!(RiskTier::from_ratio(0.9), RiskTier::High);
    }

    #[test]
    fn test_record_observation_ratio_and_risk() {
        let mut flag = SenderFlag::new(1, "spammer@example.com", FlagKind::Spam);
        let now = Utc::now();

        flag.record_observation(true, now);
        assert_eq!(flag.total_emails, 1);
        assert_eq!(flag.spam_emails, 1);
        assert_eq!(flag.risk, RiskTier::High);

        flag.record_observation(false, now);
        assert_eq!(flag.total_emails, 2);
        assert!((flag.spam_ratio - 0.5).abs() < f32::EPSILON);
        assert_eq!(flag.risk, RiskTier::Medium);
    }

    #[test]
    fn test_record_observation_seen_window() {
        let mut flag = SenderFlag::new(1, "a@example.com", FlagKind::Whitelist);
        let older = Utc::now() - Duration::days(2);
        let newer = Utc::now();

        flag.record_observation(false, newer);
        flag.record_observation(false, older);

        assert_eq!(flag.first_seen, Some(older));
        assert_eq!(flag.last_seen, Some(newer));
    }

    #[test]
    fn test_confidence_grows_with_sample() {
        let mut flag = SenderFlag::new(1, "a@example.com", FlagKind::Whitelist);
        let now = Utc::now();
        for _ in 0..20 {
            flag.record_observation(false, now);
        }
        assert!((flag.confidence - 1.0).abs() < f32::EPSILON);
    }
}
