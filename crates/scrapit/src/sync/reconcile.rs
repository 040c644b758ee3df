//! Reconciliation of fetched messages against local records
//!
//! Decides new-vs-existing by the (user, gmail_id) key and merges provider
//! data into existing rows without downgrading locally populated fields.
//! Also owns the within-run duplicate guard: a message ID appearing twice in
//! one run is processed once.

use std::collections::HashSet;

use chrono::Utc;

use crate::gmail::{FetchedMessage, parse_mail_date};
use crate::models::{EmailRecord, GmailId};

/// What the reconciler decided for one fetched message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// No local record existed; a full record was staged
    New,
    /// A local record existed and at least one field changed
    Updated,
    /// A local record existed and nothing changed
    Unchanged,
}

/// Tracks message IDs already seen within a single sync run
#[derive(Debug, Default)]
pub struct SeenIds {
    seen: HashSet<String>,
}

impl SeenIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ID; returns false if it was already seen in this run
    pub fn insert(&mut self, id: &str) -> bool {
        self.seen.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Merge a fetched message into the local state.
///
/// For a new message the full record is built with processed=false and the
/// Date header parsed (falling back to now). For an existing record only
/// provider-authoritative fields are taken: the label set always, subject /
/// snippet / body only when the local value is empty. Populated local fields
/// are never overwritten with provider-supplied emptiness.
pub fn merge_fetched(
    user_id: i64,
    fetched: &FetchedMessage,
    existing: Option<EmailRecord>,
) -> (EmailRecord, Disposition) {
    let Some(mut record) = existing else {
        let received_at = fetched
            .date
            .as_deref()
            .and_then(parse_mail_date)
            .unwrap_or_else(Utc::now);

        let record = EmailRecord::builder(user_id, GmailId::new(&fetched.gmail_id))
            .thread_id(fetched.thread_id.clone())
            .subject(&fetched.subject)
            .sender(&fetched.sender)
            .recipient(&fetched.recipient)
            .snippet(&fetched.snippet)
            .body(fetched.body.clone())
            .received_at(received_at)
            .labels(fetched.labels.clone())
            .build();

        return (record, Disposition::New);
    };

    let mut changed = false;

    // Labels are always authoritative from the provider, order included
    if record.labels != fetched.labels {
        record.labels = fetched.labels.clone();
        changed = true;
    }

    if record.subject.is_empty() && !fetched.subject.is_empty() {
        record.subject = fetched.subject.clone();
        changed = true;
    }

    if record.snippet.is_empty() && !fetched.snippet.is_empty() {
        record.snippet = fetched.snippet.clone();
        changed = true;
    }

    if record.body.as_deref().is_none_or(|b| b.is_empty())
        && let Some(body) = &fetched.body
        && !body.is_empty()
    {
        record.body = Some(body.clone());
        changed = true;
    }

    if record.thread_id.is_none() && fetched.thread_id.is_some() {
        record.thread_id = fetched.thread_id.clone();
        changed = true;
    }

    let disposition = if changed {
        Disposition::Updated
    } else {
        Disposition::Unchanged
    };
    (record, disposition)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(id: &str) -> FetchedMessage {
        FetchedMessage {
            gmail_id: id.to_string(),
            thread_id: Some("t1".to_string()),
            subject: "Subject".to_string(),
            sender: "a@example.com".to_string(),
            recipient: "b@example.com".to_string(),
            date: Some("Mon, 15 Jul 2024 10:30:00 +0000".to_string()),
            snippet: "preview".to_string(),
            labels: vec!["INBOX".to_string()],
            body: Some("body".to_string()),
        }
    }

    #[test]
    fn test_merge_new_record() {
        let (record, disposition) = merge_fetched(1, &fetched("m1"), None);
        assert_eq!(disposition, Disposition::New);
        assert_eq!(record.gmail_id.as_str(), "m1");
        assert_eq!(record.subject, "Subject");
        assert_eq!(record.received_at.to_rfc3339(), "2024-07-15T10:30:00+00:00");
        assert!(!record.is_processed);
    }

    #[test]
    fn test_merge_new_record_bad_date_falls_back_to_now() {
        let mut msg = fetched("m1");
        msg.date = Some("garbage".to_string());
        let before = Utc::now();
        let (record, _) = merge_fetched(1, &msg, None);
        assert!(record.received_at >= before);
    }

    #[test]
    fn test_merge_existing_labels_always_win() {
        let (existing, _) = merge_fetched(1, &fetched("m1"), None);

        let mut msg = fetched("m1");
        msg.labels = vec!["INBOX".to_string(), "IMPORTANT".to_string()];
        let (merged, disposition) = merge_fetched(1, &msg, Some(existing));

        assert_eq!(disposition, Disposition::Updated);
        assert_eq!(merged.labels, vec!["INBOX", "IMPORTANT"]);
    }

    #[test]
    fn test_merge_existing_no_downgrade() {
        let (existing, _) = merge_fetched(1, &fetched("m1"), None);

        // Provider now reports empty subject/snippet/body
        let mut msg = fetched("m1");
        msg.subject = String::new();
        msg.snippet = String::new();
        msg.body = None;
        let (merged, disposition) = merge_fetched(1, &msg, Some(existing));

        assert_eq!(disposition, Disposition::Unchanged);
        assert_eq!(merged.subject, "Subject");
        assert_eq!(merged.snippet, "preview");
        assert_eq!(merged.body.as_deref(), Some("body"));
    }

    #[test]
    fn test_merge_fills_empty_local_fields() {
        let mut bare = fetched("m1");
        bare.subject = String::new();
        bare.body = None;
        let (existing, _) = merge_fetched(1, &bare, None);
        assert!(existing.subject.is_empty());

        let (merged, disposition) = merge_fetched(1, &fetched("m1"), Some(existing));
        assert_eq!(disposition, Disposition::Updated);
        assert_eq!(merged.subject, "Subject");
        assert_eq!(merged.body.as_deref(), Some("body"));
    }

    #[test]
    fn test_merge_unchanged() {
        let (existing, _) = merge_fetched(1, &fetched("m1"), None);
        let (_, disposition) = merge_fetched(1, &fetched("m1"), Some(existing));
        assert_eq!(disposition, Disposition::Unchanged);
    }

    #[test]
    fn test_merge_preserves_classification() {
        let (mut existing, _) = merge_fetched(1, &fetched("m1"), None);
        existing.is_processed = true;
        existing.is_spam = true;

        let mut msg = fetched("m1");
        msg.labels.push("SPAM".to_string());
        let (merged, _) = merge_fetched(1, &msg, Some(existing));
        assert!(merged.is_processed);
        assert!(merged.is_spam);
    }

    #[test]
    fn test_seen_ids_dedup() {
        let mut seen = SeenIds::new();
        assert!(seen.insert("m1"));
        assert!(seen.insert("m2"));
        assert!(!seen.insert("m1"));
        assert_eq!(seen.len(), 2);
    }
}
