//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{
    Category, Classification, EmailRecord, GmailId, SenderFlag, SyncRun, Task, User,
};

/// Trait for ScrapIt storage operations
///
/// Every entity is owned by a user; email lookups are always keyed by the
/// (user, gmail_id) pair, which carries a unique index. All email writes go
/// through upserts so repeated syncs never violate that invariant.
pub trait EmailStore: Send + Sync {
    // === Users ===

    /// Insert a user, returning it with its assigned id
    fn create_user(&self, user: User) -> Result<User>;

    /// Get a user by id
    fn get_user(&self, id: i64) -> Result<Option<User>>;

    /// Get a user by email address
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Replace a user's OAuth token pair (after a refresh)
    fn update_user_tokens(
        &self,
        id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<()>;

    /// Record when the user's last successful sync finished
    fn set_last_synced(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    // === Emails ===

    /// Get an email by its unique (user, gmail_id) key
    fn get_email(&self, user_id: i64, gmail_id: &GmailId) -> Result<Option<EmailRecord>>;

    /// Check if an email exists
    fn has_email(&self, user_id: i64, gmail_id: &GmailId) -> Result<bool>;

    /// Upsert a batch of email records in a single transaction.
    ///
    /// Either every record in the batch becomes durable or none does; on
    /// failure the transaction is rolled back and the error returned.
    fn commit_batch(&self, records: &[EmailRecord]) -> Result<()>;

    /// The most recent received_at among a user's emails, used to build the
    /// incremental sync filter
    fn latest_received_at(&self, user_id: i64) -> Result<Option<DateTime<Utc>>>;

    /// Count a user's emails
    fn count_emails(&self, user_id: i64) -> Result<usize>;

    /// List emails that have not been classified yet, oldest first
    fn list_unprocessed(&self, user_id: i64, limit: usize) -> Result<Vec<EmailRecord>>;

    /// Store a classification outcome and mark the email processed
    fn apply_classification(
        &self,
        user_id: i64,
        gmail_id: &GmailId,
        classification: &Classification,
    ) -> Result<()>;

    /// Replace an email's label set
    fn update_email_labels(
        &self,
        user_id: i64,
        gmail_id: &GmailId,
        labels: &[String],
    ) -> Result<()>;

    /// Set the soft-delete flag
    fn mark_deleted(&self, user_id: i64, gmail_id: &GmailId) -> Result<()>;

    /// Set the archived flag
    fn mark_archived(&self, user_id: i64, gmail_id: &GmailId) -> Result<()>;

    /// Remove the email row entirely (permanent delete)
    fn remove_email(&self, user_id: i64, gmail_id: &GmailId) -> Result<()>;

    /// Blank stored bodies for old low-value emails, returning how many
    /// records were cleaned
    fn clear_old_bodies(
        &self,
        user_id: i64,
        cutoff: DateTime<Utc>,
        categories: &[Category],
    ) -> Result<usize>;

    // === Sender flags ===

    /// Get the flag for a (user, sender) pair
    fn get_sender_flag(&self, user_id: i64, sender: &str) -> Result<Option<SenderFlag>>;

    /// Insert or replace the flag for a (user, sender) pair
    fn upsert_sender_flag(&self, flag: SenderFlag) -> Result<()>;

    // === Tasks ===

    /// Insert a task, returning it with its assigned id
    fn insert_task(&self, task: Task) -> Result<Task>;

    /// Get a task by id
    fn get_task(&self, id: i64) -> Result<Option<Task>>;

    /// Persist a task's current state (status, steps, progress, results)
    fn update_task(&self, task: &Task) -> Result<()>;

    // === Sync runs ===

    /// Insert a sync run record, returning it with its assigned id
    fn create_run(&self, run: SyncRun) -> Result<SyncRun>;

    /// Persist a run checkpoint
    fn update_run(&self, run: &SyncRun) -> Result<()>;

    /// Get a run by id
    fn get_run(&self, id: i64) -> Result<Option<SyncRun>>;
}
