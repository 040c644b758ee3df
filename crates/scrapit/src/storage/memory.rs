//! In-memory storage implementation
//!
//! Used by the test suites and as a reference implementation of the store
//! contract. Data lives in RwLock-protected maps; email uniqueness falls out
//! of the (user_id, gmail_id) map key.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};

use super::EmailStore;
use crate::models::{
    Category, Classification, EmailRecord, GmailId, SenderFlag, SyncRun, Task, User,
};

pub struct InMemoryStore {
    users: RwLock<HashMap<i64, User>>,
    /// Keyed by (user_id, gmail_id) - the unique index
    emails: RwLock<HashMap<(i64, String), EmailRecord>>,
    /// Keyed by (user_id, sender)
    sender_flags: RwLock<HashMap<(i64, String), SenderFlag>>,
    tasks: RwLock<HashMap<i64, Task>>,
    runs: RwLock<HashMap<i64, SyncRun>>,
    next_id: AtomicI64,
    /// When set, commit_batch fails; lets tests exercise the persistence
    /// failure path
    fail_commits: AtomicBool,
}

impl InMemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            emails: RwLock::new(HashMap::new()),
            sender_flags: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
            runs: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            fail_commits: AtomicBool::new(false),
        }
    }

    /// Make every subsequent commit_batch call fail (or succeed again)
    pub fn set_commit_failure(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    fn assign_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn email_key(user_id: i64, gmail_id: &GmailId) -> (i64, String) {
        (user_id, gmail_id.as_str().to_string())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EmailStore for InMemoryStore {
    fn create_user(&self, mut user: User) -> Result<User> {
        user.id = self.assign_id();
        self.users.write().unwrap().insert(user.id, user.clone());
        Ok(user)
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.users.read().unwrap().get(&id).cloned())
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    fn update_user_tokens(
        &self,
        id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<()> {
        let mut users = self.users.write().unwrap();
        if let Some(user) = users.get_mut(&id) {
            user.access_token = Some(access_token.to_string());
            user.refresh_token = refresh_token.map(|s| s.to_string());
        }
        Ok(())
    }

    fn set_last_synced(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut users = self.users.write().unwrap();
        if let Some(user) = users.get_mut(&id) {
            user.last_synced_at = Some(at);
        }
        Ok(())
    }

    fn get_email(&self, user_id: i64, gmail_id: &GmailId) -> Result<Option<EmailRecord>> {
        Ok(self
            .emails
            .read()
            .unwrap()
            .get(&Self::email_key(user_id, gmail_id))
            .cloned())
    }

    fn has_email(&self, user_id: i64, gmail_id: &GmailId) -> Result<bool> {
        Ok(self
            .emails
            .read()
            .unwrap()
            .contains_key(&Self::email_key(user_id, gmail_id)))
    }

    fn commit_batch(&self, records: &[EmailRecord]) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            bail!("commit failed (injected)");
        }

        let mut emails = self.emails.write().unwrap();
        for record in records {
            let key = Self::email_key(record.user_id, &record.gmail_id);
            let mut record = record.clone();
            if let Some(existing) = emails.get(&key) {
                record.id = existing.id;
                record.created_at = existing.created_at;
            } else if record.id == 0 {
                record.id = self.assign_id();
            }
            emails.insert(key, record);
        }
        Ok(())
    }

    fn latest_received_at(&self, user_id: i64) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .emails
            .read()
            .unwrap()
            .values()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.received_at)
            .max())
    }

    fn count_emails(&self, user_id: i64) -> Result<usize> {
        Ok(self
            .emails
            .read()
            .unwrap()
            .values()
            .filter(|e| e.user_id == user_id)
            .count())
    }

    fn list_unprocessed(&self, user_id: i64, limit: usize) -> Result<Vec<EmailRecord>> {
        let emails = self.emails.read().unwrap();
        let mut result: Vec<EmailRecord> = emails
            .values()
            .filter(|e| e.user_id == user_id && !e.is_processed)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        result.truncate(limit);
        Ok(result)
    }

    fn apply_classification(
        &self,
        user_id: i64,
        gmail_id: &GmailId,
        classification: &Classification,
    ) -> Result<()> {
        let mut emails = self.emails.write().unwrap();
        if let Some(email) = emails.get_mut(&Self::email_key(user_id, gmail_id)) {
            classification.apply_to(email);
        }
        Ok(())
    }

    fn update_email_labels(
        &self,
        user_id: i64,
        gmail_id: &GmailId,
        labels: &[String],
    ) -> Result<()> {
        let mut emails = self.emails.write().unwrap();
        if let Some(email) = emails.get_mut(&Self::email_key(user_id, gmail_id)) {
            email.labels = labels.to_vec();
        }
        Ok(())
    }

    fn mark_deleted(&self, user_id: i64, gmail_id: &GmailId) -> Result<()> {
        let mut emails = self.emails.write().unwrap();
        if let Some(email) = emails.get_mut(&Self::email_key(user_id, gmail_id)) {
            email.is_deleted = true;
        }
        Ok(())
    }

    fn mark_archived(&self, user_id: i64, gmail_id: &GmailId) -> Result<()> {
        let mut emails = self.emails.write().unwrap();
        if let Some(email) = emails.get_mut(&Self::email_key(user_id, gmail_id)) {
            email.is_archived = true;
        }
        Ok(())
    }

    fn remove_email(&self, user_id: i64, gmail_id: &GmailId) -> Result<()> {
        self.emails
            .write()
            .unwrap()
            .remove(&Self::email_key(user_id, gmail_id));
        Ok(())
    }

    fn clear_old_bodies(
        &self,
        user_id: i64,
        cutoff: DateTime<Utc>,
        categories: &[Category],
    ) -> Result<usize> {
        let mut emails = self.emails.write().unwrap();
        let mut cleaned = 0;
        for email in emails.values_mut() {
            if email.user_id == user_id
                && email.received_at < cutoff
                && email.body.is_some()
                && email.category.is_some_and(|c| categories.contains(&c))
            {
                email.body = None;
                email.snippet = format!("[Archived - {}]", email.category.unwrap().as_str());
                cleaned += 1;
            }
        }
        Ok(cleaned)
    }

    fn get_sender_flag(&self, user_id: i64, sender: &str) -> Result<Option<SenderFlag>> {
        Ok(self
            .sender_flags
            .read()
            .unwrap()
            .get(&(user_id, sender.to_string()))
            .cloned())
    }

    fn upsert_sender_flag(&self, mut flag: SenderFlag) -> Result<()> {
        let key = (flag.user_id, flag.sender.clone());
        let mut flags = self.sender_flags.write().unwrap();
        if let Some(existing) = flags.get(&key) {
            flag.id = existing.id;
        } else if flag.id == 0 {
            flag.id = self.assign_id();
        }
        flags.insert(key, flag);
        Ok(())
    }

    fn insert_task(&self, mut task: Task) -> Result<Task> {
        task.id = self.assign_id();
        self.tasks.write().unwrap().insert(task.id, task.clone());
        Ok(task)
    }

    fn get_task(&self, id: i64) -> Result<Option<Task>> {
        Ok(self.tasks.read().unwrap().get(&id).cloned())
    }

    fn update_task(&self, task: &Task) -> Result<()> {
        self.tasks.write().unwrap().insert(task.id, task.clone());
        Ok(())
    }

    fn create_run(&self, mut run: SyncRun) -> Result<SyncRun> {
        run.id = self.assign_id();
        self.runs.write().unwrap().insert(run.id, run.clone());
        Ok(run)
    }

    fn update_run(&self, run: &SyncRun) -> Result<()> {
        self.runs.write().unwrap().insert(run.id, run.clone());
        Ok(())
    }

    fn get_run(&self, id: i64) -> Result<Option<SyncRun>> {
        Ok(self.runs.read().unwrap().get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FlagKind, TaskKind};

    fn make_email(user_id: i64, gmail_id: &str) -> EmailRecord {
        EmailRecord::builder(user_id, GmailId::new(gmail_id))
            .subject("Test")
            .sender("test@example.com")
            .snippet("preview")
            .build()
    }

    #[test]
    fn test_user_crud() {
        let store = InMemoryStore::new();
        let user = store
            .create_user(User::new("a@example.com", "sub1"))
            .unwrap();
        assert!(user.id > 0);

        let found = store.get_user(user.id).unwrap().unwrap();
        assert_eq!(found.email, "a@example.com");

        let by_email = store.get_user_by_email("a@example.com").unwrap();
        assert!(by_email.is_some());

        store
            .update_user_tokens(user.id, "new-access", Some("new-refresh"))
            .unwrap();
        let found = store.get_user(user.id).unwrap().unwrap();
        assert_eq!(found.access_token.as_deref(), Some("new-access"));
    }

    #[test]
    fn test_commit_batch_upserts() {
        let store = InMemoryStore::new();

        let email = make_email(1, "g1");
        store.commit_batch(&[email.clone()]).unwrap();
        assert_eq!(store.count_emails(1).unwrap(), 1);

        // Committing the same gmail_id again must not create a second row
        let mut updated = make_email(1, "g1");
        updated.subject = "Changed".to_string();
        store.commit_batch(&[updated]).unwrap();
        assert_eq!(store.count_emails(1).unwrap(), 1);

        let found = store.get_email(1, &GmailId::new("g1")).unwrap().unwrap();
        assert_eq!(found.subject, "Changed");
    }

    #[test]
    fn test_commit_batch_preserves_id_and_created_at() {
        let store = InMemoryStore::new();
        store.commit_batch(&[make_email(1, "g1")]).unwrap();
        let first = store.get_email(1, &GmailId::new("g1")).unwrap().unwrap();

        store.commit_batch(&[make_email(1, "g1")]).unwrap();
        let second = store.get_email(1, &GmailId::new("g1")).unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
    }

    #[test]
    fn test_injected_commit_failure() {
        let store = InMemoryStore::new();
        store.set_commit_failure(true);
        assert!(store.commit_batch(&[make_email(1, "g1")]).is_err());
        assert_eq!(store.count_emails(1).unwrap(), 0);

        store.set_commit_failure(false);
        assert!(store.commit_batch(&[make_email(1, "g1")]).is_ok());
    }

    #[test]
    fn test_latest_received_at() {
        let store = InMemoryStore::new();
        assert!(store.latest_received_at(1).unwrap().is_none());

        let older = Utc::now() - chrono::Duration::days(3);
        let newer = Utc::now();

        let mut e1 = make_email(1, "g1");
        e1.received_at = older;
        let mut e2 = make_email(1, "g2");
        e2.received_at = newer;
        // Another user's email must not affect the result
        let mut e3 = make_email(2, "g3");
        e3.received_at = newer + chrono::Duration::days(1);

        store.commit_batch(&[e1, e2, e3]).unwrap();
        assert_eq!(store.latest_received_at(1).unwrap(), Some(newer));
    }

    #[test]
    fn test_sender_flag_upsert() {
        let store = InMemoryStore::new();

        let mut flag = SenderFlag::new(1, "spam@example.com", FlagKind::Spam);
        flag.record_observation(true, Utc::now());
        store.upsert_sender_flag(flag).unwrap();

        let found = store.get_sender_flag(1, "spam@example.com").unwrap().unwrap();
        assert_eq!(found.total_emails, 1);
        let id = found.id;

        let mut flag = found;
        flag.record_observation(true, Utc::now());
        store.upsert_sender_flag(flag).unwrap();

        let found = store.get_sender_flag(1, "spam@example.com").unwrap().unwrap();
        assert_eq!(found.total_emails, 2);
        assert_eq!(found.id, id);
    }

    #[test]
    fn test_clear_old_bodies() {
        let store = InMemoryStore::new();

        let mut old_promo = make_email(1, "g1");
        old_promo.received_at = Utc::now() - chrono::Duration::days(120);
        old_promo.body = Some("huge body".to_string());
        old_promo.category = Some(Category::Promotional);

        let mut old_work = make_email(1, "g2");
        old_work.received_at = Utc::now() - chrono::Duration::days(120);
        old_work.body = Some("important".to_string());
        old_work.category = Some(Category::Work);

        store.commit_batch(&[old_promo, old_work]).unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(90);
        let cleaned = store
            .clear_old_bodies(1, cutoff, &[Category::Promotional, Category::Newsletter])
            .unwrap();
        assert_eq!(cleaned, 1);

        let promo = store.get_email(1, &GmailId::new("g1")).unwrap().unwrap();
        assert!(promo.body.is_none());
        assert_eq!(promo.snippet, "[Archived - promotional]");

        // Work email untouched
        let work = store.get_email(1, &GmailId::new("g2")).unwrap().unwrap();
        assert_eq!(work.body.as_deref(), Some("important"));
    }

    #[test]
    fn test_task_crud() {
        let store = InMemoryStore::new();
        let task = store
            .insert_task(Task::new(1, TaskKind::Custom, "test", Vec::new()))
            .unwrap();
        assert!(task.id > 0);

        let mut task = store.get_task(task.id).unwrap().unwrap();
        task.progress = 50;
        store.update_task(&task).unwrap();

        assert_eq!(store.get_task(task.id).unwrap().unwrap().progress, 50);
    }

    #[test]
    fn test_run_crud() {
        let store = InMemoryStore::new();
        let run = store.create_run(SyncRun::new(1)).unwrap();
        assert!(run.id > 0);

        let mut run = store.get_run(run.id).unwrap().unwrap();
        run.complete(Default::default());
        store.update_run(&run).unwrap();

        let found = store.get_run(run.id).unwrap().unwrap();
        assert!(found.phase.is_terminal());
    }
}
