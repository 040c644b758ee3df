//! Email classification
//!
//! Classification runs one email at a time: the model returns a JSON object
//! that is validated against the known category set and confidence range
//! before anything touches the store. A response that fails validation falls
//! back to the rule-based classification rather than being patched up.

mod llm;
mod spam;

pub use llm::{ClassifyRequest, CompletionBackend, OpenAiBackend};
pub use spam::{risk_from_score, spam_score};

use anyhow::{Result, bail};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::models::{Category, Classification, EmailRecord, FlagKind, SenderFlag};
use crate::storage::EmailStore;

/// Model spam verdicts are overridden when the rule score exceeds this
const RULE_SPAM_THRESHOLD: f32 = 0.7;

/// Fallback classification flags spam at this rule score
const FALLBACK_SPAM_THRESHOLD: f32 = 0.8;

/// Counters from a batch classification pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyStats {
    pub processed: usize,
    pub spam_found: usize,
    /// Responses that failed validation and took the rule-based fallback
    pub fallbacks: usize,
}

/// The shape a model response must satisfy
#[derive(Debug, Deserialize)]
struct RawClassification {
    category: String,
    confidence: f32,
    #[serde(default)]
    is_spam: bool,
}

/// Validate a raw model payload into (category, confidence, is_spam).
///
/// Rejects unknown categories and out-of-range confidence instead of
/// coercing them.
fn parse_classification(raw: &str) -> Result<(Category, f32, bool)> {
    let parsed: RawClassification = serde_json::from_str(raw)?;

    let category = Category::parse(&parsed.category);
    if category == Category::Unknown && !parsed.category.trim().eq_ignore_ascii_case("unknown") {
        bail!("model returned unknown category '{}'", parsed.category);
    }

    if !(0.0..=1.0).contains(&parsed.confidence) {
        bail!("model confidence {} out of range", parsed.confidence);
    }

    Ok((category, parsed.confidence, parsed.is_spam))
}

/// Rule-based classification used when the model output is unusable
fn fallback_classification(score: f32) -> Classification {
    let is_spam = score > FALLBACK_SPAM_THRESHOLD;
    Classification {
        category: Category::Unknown,
        confidence: 0.0,
        is_spam,
        spam_score: score,
        spam_reason: is_spam.then(|| format!("Rule-based fallback (score: {:.2})", score)),
        sender_risk: risk_from_score(score),
    }
}

/// Classify one email, blending the model verdict with the rule score
pub fn classify_email(backend: &dyn CompletionBackend, email: &EmailRecord) -> Classification {
    let score = spam_score(&email.subject, &email.sender, &email.snippet);

    let request = ClassifyRequest {
        subject: &email.subject,
        sender: &email.sender,
        snippet: &email.snippet,
    };

    let raw = match backend.classify(&request) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(
                "Classification request failed for {}: {}",
                email.gmail_id, e
            );
            return fallback_classification(score);
        }
    };

    match parse_classification(&raw) {
        Ok((category, confidence, mut is_spam)) => {
            let mut spam_reason = None;
            // The rule score acts as a floor under the model verdict
            if score > RULE_SPAM_THRESHOLD && !is_spam {
                is_spam = true;
                spam_reason = Some(format!("Rule-based detection (score: {:.2})", score));
            }
            Classification {
                category,
                confidence,
                is_spam,
                spam_score: score,
                spam_reason,
                sender_risk: risk_from_score(score),
            }
        }
        Err(e) => {
            warn!(
                "Rejected model response for {}: {} (raw: {})",
                email.gmail_id, e, raw
            );
            fallback_classification(score)
        }
    }
}

/// Classify a user's unprocessed emails, updating each record and the
/// sender's rolling statistics.
pub fn classify_unprocessed(
    store: &dyn EmailStore,
    backend: &dyn CompletionBackend,
    user_id: i64,
    limit: usize,
) -> Result<ClassifyStats> {
    let emails = store.list_unprocessed(user_id, limit)?;
    let mut stats = ClassifyStats::default();

    info!(
        "Classifying {} unprocessed emails for user {}",
        emails.len(),
        user_id
    );

    for email in &emails {
        let mut classification = classify_email(backend, email);
        if classification.confidence == 0.0 && classification.category == Category::Unknown {
            stats.fallbacks += 1;
        }

        // Fold this observation into the sender's statistics; an existing
        // flag's risk tier (built from history) beats the single-message one
        let sender = email.sender_address().to_string();
        if !sender.is_empty() {
            let existing = store.get_sender_flag(user_id, &sender)?;
            let flag = match existing {
                Some(mut flag) => {
                    flag.record_observation(classification.is_spam, email.received_at);
                    Some(flag)
                }
                None if classification.is_spam => {
                    let mut flag = SenderFlag::new(user_id, &sender, FlagKind::Spam);
                    flag.record_observation(true, email.received_at);
                    Some(flag)
                }
                None => None,
            };
            if let Some(flag) = flag {
                classification.sender_risk = flag.risk;
                store.upsert_sender_flag(flag)?;
            }
        }

        store.apply_classification(user_id, &email.gmail_id, &classification)?;
        stats.processed += 1;
        if classification.is_spam {
            stats.spam_found += 1;
        }
        debug!(
            "Classified {} as {} (confidence {:.2}, spam: {})",
            email.gmail_id,
            classification.category.as_str(),
            classification.confidence,
            classification.is_spam
        );
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GmailId, RiskTier};
    use crate::storage::InMemoryStore;

    /// Backend returning a canned payload (or an error)
    struct CannedBackend {
        payload: Option<String>,
    }

    impl CannedBackend {
        fn returning(payload: &str) -> Self {
            Self {
                payload: Some(payload.to_string()),
            }
        }

        fn failing() -> Self {
            Self { payload: None }
        }
    }

    impl CompletionBackend for CannedBackend {
        fn classify(&self, _request: &ClassifyRequest) -> Result<String> {
            match &self.payload {
                Some(p) => Ok(p.clone()),
                None => bail!("backend unavailable"),
            }
        }
    }

    fn plain_email(id: &str, subject: &str) -> EmailRecord {
        EmailRecord::builder(1, GmailId::new(id))
            .subject(subject)
            .sender("Sender <sender@example.com>")
            .snippet("ordinary content")
            .build()
    }

    #[test]
    fn test_parse_valid_response() {
        let (category, confidence, is_spam) =
            parse_classification(r#"{"category": "work", "confidence": 0.9, "is_spam": false}"#)
                .unwrap();
        assert_eq!(category, Category::Work);
        assert!((confidence - 0.9).abs() < f32::EPSILON);
        assert!(!is_spam);
    }

    #[test]
    fn test_parse_rejects_unknown_category() {
        assert!(
            parse_classification(r#"{"category": "pizza", "confidence": 0.9}"#).is_err()
        );
    }

    #[test]
    fn test_parse_rejects_out_of_range_confidence() {
        assert!(
            parse_classification(r#"{"category": "work", "confidence": 1.5}"#).is_err()
        );
        assert!(
            parse_classification(r#"{"category": "work", "confidence": -0.1}"#).is_err()
        );
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_classification("Category: work\nConfidence: 0.9").is_err());
    }

    #[test]
    fn test_classify_uses_model_verdict() {
        let backend =
            CannedBackend::returning(r#"{"category": "newsletter", "confidence": 0.8}"#);
        let classification = classify_email(&backend, &plain_email("m1", "Weekly digest"));
        assert_eq!(classification.category, Category::Newsletter);
        assert!(!classification.is_spam);
    }

    #[test]
    fn test_classify_invalid_response_falls_back() {
        let backend = CannedBackend::returning("not json at all");
        let classification = classify_email(&backend, &plain_email("m1", "Hello"));
        assert_eq!(classification.category, Category::Unknown);
        assert_eq!(classification.confidence, 0.0);
    }

    #[test]
    fn test_classify_backend_error_falls_back() {
        let backend = CannedBackend::failing();
        let classification = classify_email(&backend, &plain_email("m1", "Hello"));
        assert_eq!(classification.category, Category::Unknown);
    }

    #[test]
    fn test_rule_score_overrides_model_spam_verdict() {
        // Model says not spam, but the subject is blatant
        let backend =
            CannedBackend::returning(r#"{"category": "promotional", "confidence": 0.6}"#);
        let email = EmailRecord::builder(1, GmailId::new("m1"))
            .subject("URGENT!!! FREE WINNER - act now, limited time, click here!!!")
            .sender("noreply@4281990123.example")
            .snippet("congratulations you have won, claim your prize, click here")
            .build();

        let classification = classify_email(&backend, &email);
        assert!(classification.is_spam);
        assert!(classification.spam_reason.is_some());
        assert_eq!(classification.sender_risk, RiskTier::High);
    }

    #[test]
    fn test_classify_unprocessed_updates_store() {
        let store = InMemoryStore::new();
        store
            .commit_batch(&[
                plain_email("m1", "Project update"),
                plain_email("m2", "Another one"),
            ])
            .unwrap();

        let backend =
            CannedBackend::returning(r#"{"category": "work", "confidence": 0.9, "is_spam": false}"#);
        let stats = classify_unprocessed(&store, &backend, 1, 10).unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.spam_found, 0);

        let email = store.get_email(1, &GmailId::new("m1")).unwrap().unwrap();
        assert!(email.is_processed);
        assert_eq!(email.category, Some(Category::Work));

        // Second pass finds nothing left to do
        let stats = classify_unprocessed(&store, &backend, 1, 10).unwrap();
        assert_eq!(stats.processed, 0);
    }

    #[test]
    fn test_classify_unprocessed_tracks_spam_senders() {
        let store = InMemoryStore::new();
        store
            .commit_batch(&[plain_email("m1", "Totally normal")])
            .unwrap();

        let backend = CannedBackend::returning(
            r#"{"category": "spam", "confidence": 0.95, "is_spam": true}"#,
        );
        let stats = classify_unprocessed(&store, &backend, 1, 10).unwrap();
        assert_eq!(stats.spam_found, 1);

        let flag = store
            .get_sender_flag(1, "sender@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(flag.total_emails, 1);
        assert_eq!(flag.spam_emails, 1);
        assert_eq!(flag.risk, RiskTier::High);

        // The stored email carries the history-derived risk
        let email = store.get_email(1, &GmailId::new("m1")).unwrap().unwrap();
        assert_eq!(email.sender_risk, Some(RiskTier::High));
    }

    #[test]
    fn test_clean_sender_gets_no_flag() {
        let store = InMemoryStore::new();
        store
            .commit_batch(&[plain_email("m1", "Regular mail")])
            .unwrap();

        let backend = CannedBackend::returning(
            r#"{"category": "personal", "confidence": 0.8, "is_spam": false}"#,
        );
        classify_unprocessed(&store, &backend, 1, 10).unwrap();

        assert!(
            store
                .get_sender_flag(1, "sender@example.com")
                .unwrap()
                .is_none()
        );
    }
}
