//! SQLite-backed storage
//!
//! Metadata lives in queryable columns; email bodies are zstd-compressed
//! blobs; label lists, task steps, and run stats are JSON columns so their
//! ordering survives round-trips.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::EmailStore;
use crate::models::{
    Category, Classification, EmailRecord, FlagKind, GmailId, RiskTier, RunPhase, SenderFlag,
    SyncRun, SyncStats, Task, TaskKind, TaskStatus, TaskStep, User,
};

/// Database migrations
///
/// Applied in order; the user_version pragma tracks which migrations have
/// run.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: users, emails, sender flags, tasks
        M::up(
            r#"
            CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                google_id TEXT NOT NULL UNIQUE,
                access_token TEXT,
                refresh_token TEXT,
                created_at TEXT NOT NULL,
                last_synced_at TEXT
            );

            CREATE TABLE emails (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                gmail_id TEXT NOT NULL,
                thread_id TEXT,
                subject TEXT NOT NULL DEFAULT '',
                sender TEXT NOT NULL DEFAULT '',
                recipient TEXT NOT NULL DEFAULT '',
                snippet TEXT NOT NULL DEFAULT '',
                body BLOB,  -- zstd compressed
                received_at TEXT NOT NULL,
                labels TEXT NOT NULL DEFAULT '[]',
                category TEXT,
                confidence REAL,
                is_spam INTEGER NOT NULL DEFAULT 0,
                spam_score REAL,
                spam_reason TEXT,
                sender_risk TEXT,
                is_processed INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                is_archived INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Reconciliation upserts against this key
            CREATE UNIQUE INDEX idx_emails_user_gmail ON emails(user_id, gmail_id);
            CREATE INDEX idx_emails_user_received ON emails(user_id, received_at DESC);
            CREATE INDEX idx_emails_user_unprocessed ON emails(user_id, is_processed);

            CREATE TABLE sender_flags (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                sender TEXT NOT NULL,
                kind TEXT NOT NULL,
                risk TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 0,
                total_emails INTEGER NOT NULL DEFAULT 0,
                spam_emails INTEGER NOT NULL DEFAULT 0,
                spam_ratio REAL NOT NULL DEFAULT 0,
                first_seen TEXT,
                last_seen TEXT,
                flagged_at TEXT NOT NULL,
                user_confirmed INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE UNIQUE INDEX idx_sender_flags_user_sender
                ON sender_flags(user_id, sender);

            CREATE TABLE tasks (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                steps TEXT NOT NULL DEFAULT '[]',
                priority INTEGER NOT NULL DEFAULT 1,
                progress INTEGER NOT NULL DEFAULT 0,
                result TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_tasks_user ON tasks(user_id, created_at DESC);
            "#,
        ),
        // Migration 2: persisted sync run status
        M::up(
            r#"
            CREATE TABLE sync_runs (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                phase TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                stats TEXT NOT NULL DEFAULT '{}',
                error TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_sync_runs_user ON sync_runs(user_id, started_at DESC);
            "#,
        ),
    ])
}

/// SQLite-backed ScrapIt store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Column list shared by every email SELECT, in `email_from_row` order
const EMAIL_COLUMNS: &str = "id, user_id, gmail_id, thread_id, subject, sender, recipient, \
     snippet, body, received_at, labels, category, confidence, is_spam, spam_score, \
     spam_reason, sender_risk, is_processed, is_deleted, is_archived, created_at";

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_ts(&s))
}

fn compress_body(body: Option<&str>) -> Result<Option<Vec<u8>>> {
    body.map(|text| zstd::encode_all(text.as_bytes(), 3))
        .transpose()
        .context("Failed to compress email body")
}

fn decompress_body(data: Option<Vec<u8>>) -> Result<Option<String>> {
    data.map(|bytes| {
        zstd::decode_all(bytes.as_slice())
            .context("Failed to decompress email body")
            .map(|decoded| String::from_utf8_lossy(&decoded).into_owned())
    })
    .transpose()
}

fn email_from_row(row: &Row) -> rusqlite::Result<(EmailRecord, Option<Vec<u8>>)> {
    let labels_json: String = row.get(10)?;
    let labels: Vec<String> = serde_json::from_str(&labels_json).unwrap_or_default();
    let category: Option<String> = row.get(11)?;
    let sender_risk: Option<String> = row.get(16)?;
    let received_at: String = row.get(9)?;
    let created_at: String = row.get(20)?;
    let body_compressed: Option<Vec<u8>> = row.get(8)?;

    let record = EmailRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        gmail_id: GmailId::new(row.get::<_, String>(2)?),
        thread_id: row.get(3)?,
        subject: row.get(4)?,
        sender: row.get(5)?,
        recipient: row.get(6)?,
        snippet: row.get(7)?,
        body: None, // filled in after decompression
        received_at: parse_ts(&received_at),
        labels,
        category: category.as_deref().map(Category::parse),
        confidence: row.get::<_, Option<f64>>(12)?.map(|v| v as f32),
        is_spam: row.get(13)?,
        spam_score: row.get::<_, Option<f64>>(14)?.map(|v| v as f32),
        spam_reason: row.get(15)?,
        sender_risk: sender_risk.as_deref().and_then(RiskTier::parse),
        is_processed: row.get(17)?,
        is_deleted: row.get(18)?,
        is_archived: row.get(19)?,
        created_at: parse_ts(&created_at),
    };

    Ok((record, body_compressed))
}

impl SqliteStore {
    /// Open (or create) a store at the given path
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL keeps readers unblocked during sync commits; NORMAL sync is
        // safe under WAL; foreign_keys is required for ON DELETE CASCADE.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn load_email(
        &self,
        conn: &Connection,
        user_id: i64,
        gmail_id: &GmailId,
    ) -> Result<Option<EmailRecord>> {
        let sql = format!(
            "SELECT {} FROM emails WHERE user_id = ?1 AND gmail_id = ?2",
            EMAIL_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![user_id, gmail_id.as_str()], email_from_row)
            .optional()?;

        let Some((mut record, body_compressed)) = row else {
            return Ok(None);
        };
        record.body = decompress_body(body_compressed)?;
        Ok(Some(record))
    }
}

impl EmailStore for SqliteStore {
    fn create_user(&self, mut user: User) -> Result<User> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO users
             (email, google_id, access_token, refresh_token, created_at, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.email,
                user.google_id,
                user.access_token,
                user.refresh_token,
                user.created_at.to_rfc3339(),
                user.last_synced_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        user.id = conn.last_insert_rowid();
        Ok(user)
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();

        let user = conn
            .query_row(
                "SELECT id, email, google_id, access_token, refresh_token,
                        created_at, last_synced_at
                 FROM users WHERE id = ?1",
                [id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        google_id: row.get(2)?,
                        access_token: row.get(3)?,
                        refresh_token: row.get(4)?,
                        created_at: parse_ts(&row.get::<_, String>(5)?),
                        last_synced_at: parse_opt_ts(row.get(6)?),
                    })
                },
            )
            .optional()?;

        Ok(user)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let id: Option<i64> = {
            let conn = self.conn.lock().unwrap();
            conn.query_row("SELECT id FROM users WHERE email = ?1", [email], |row| {
                row.get(0)
            })
            .optional()?
        };

        match id {
            Some(id) => self.get_user(id),
            None => Ok(None),
        }
    }

    fn update_user_tokens(
        &self,
        id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE users SET access_token = ?1, refresh_token = ?2 WHERE id = ?3",
            params![access_token, refresh_token, id],
        )?;
        Ok(())
    }

    fn set_last_synced(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE users SET last_synced_at = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    fn get_email(&self, user_id: i64, gmail_id: &GmailId) -> Result<Option<EmailRecord>> {
        let conn = self.conn.lock().unwrap();
        self.load_email(&conn, user_id, gmail_id)
    }

    fn has_email(&self, user_id: i64, gmail_id: &GmailId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM emails WHERE user_id = ?1 AND gmail_id = ?2",
            params![user_id, gmail_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn commit_batch(&self, records: &[EmailRecord]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        {
            // ON CONFLICT DO UPDATE rather than INSERT OR REPLACE: replace
            // would delete the old row first and hand out a fresh rowid.
            let mut stmt = tx.prepare(
                "INSERT INTO emails
                 (user_id, gmail_id, thread_id, subject, sender, recipient, snippet,
                  body, received_at, labels, category, confidence, is_spam, spam_score,
                  spam_reason, sender_risk, is_processed, is_deleted, is_archived, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19, ?20)
                 ON CONFLICT(user_id, gmail_id) DO UPDATE SET
                    thread_id = excluded.thread_id,
                    subject = excluded.subject,
                    sender = excluded.sender,
                    recipient = excluded.recipient,
                    snippet = excluded.snippet,
                    body = excluded.body,
                    received_at = excluded.received_at,
                    labels = excluded.labels,
                    category = excluded.category,
                    confidence = excluded.confidence,
                    is_spam = excluded.is_spam,
                    spam_score = excluded.spam_score,
                    spam_reason = excluded.spam_reason,
                    sender_risk = excluded.sender_risk,
                    is_processed = excluded.is_processed,
                    is_deleted = excluded.is_deleted,
                    is_archived = excluded.is_archived",
            )?;

            for record in records {
                let body = compress_body(record.body.as_deref())?;
                let labels = serde_json::to_string(&record.labels)?;

                stmt.execute(params![
                    record.user_id,
                    record.gmail_id.as_str(),
                    record.thread_id,
                    record.subject,
                    record.sender,
                    record.recipient,
                    record.snippet,
                    body,
                    record.received_at.to_rfc3339(),
                    labels,
                    record.category.map(|c| c.as_str()),
                    record.confidence.map(|v| v as f64),
                    record.is_spam,
                    record.spam_score.map(|v| v as f64),
                    record.spam_reason,
                    record.sender_risk.map(|r| r.as_str()),
                    record.is_processed,
                    record.is_deleted,
                    record.is_archived,
                    record.created_at.to_rfc3339(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn latest_received_at(&self, user_id: i64) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let latest: Option<String> = conn.query_row(
            "SELECT MAX(received_at) FROM emails WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(latest.map(|s| parse_ts(&s)))
    }

    fn count_emails(&self, user_id: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM emails WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn list_unprocessed(&self, user_id: i64, limit: usize) -> Result<Vec<EmailRecord>> {
        let conn = self.conn.lock().unwrap();

        let sql = format!(
            "SELECT {} FROM emails
             WHERE user_id = ?1 AND is_processed = 0
             ORDER BY received_at ASC
             LIMIT ?2",
            EMAIL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt
            .query_map(params![user_id, limit as i64], email_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::with_capacity(rows.len());
        for (mut record, body_compressed) in rows {
            record.body = decompress_body(body_compressed)?;
            result.push(record);
        }

        Ok(result)
    }

    fn apply_classification(
        &self,
        user_id: i64,
        gmail_id: &GmailId,
        classification: &Classification,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE emails SET
                category = ?1, confidence = ?2, is_spam = ?3, spam_score = ?4,
                spam_reason = ?5, sender_risk = ?6, is_processed = 1
             WHERE user_id = ?7 AND gmail_id = ?8",
            params![
                classification.category.as_str(),
                classification.confidence as f64,
                classification.is_spam,
                classification.spam_score as f64,
                classification.spam_reason,
                classification.sender_risk.as_str(),
                user_id,
                gmail_id.as_str(),
            ],
        )?;
        Ok(())
    }

    fn update_email_labels(
        &self,
        user_id: i64,
        gmail_id: &GmailId,
        labels: &[String],
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let labels_json = serde_json::to_string(labels)?;
        conn.execute(
            "UPDATE emails SET labels = ?1 WHERE user_id = ?2 AND gmail_id = ?3",
            params![labels_json, user_id, gmail_id.as_str()],
        )?;
        Ok(())
    }

    fn mark_deleted(&self, user_id: i64, gmail_id: &GmailId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE emails SET is_deleted = 1 WHERE user_id = ?1 AND gmail_id = ?2",
            params![user_id, gmail_id.as_str()],
        )?;
        Ok(())
    }

    fn mark_archived(&self, user_id: i64, gmail_id: &GmailId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE emails SET is_archived = 1 WHERE user_id = ?1 AND gmail_id = ?2",
            params![user_id, gmail_id.as_str()],
        )?;
        Ok(())
    }

    fn remove_email(&self, user_id: i64, gmail_id: &GmailId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM emails WHERE user_id = ?1 AND gmail_id = ?2",
            params![user_id, gmail_id.as_str()],
        )?;
        Ok(())
    }

    fn clear_old_bodies(
        &self,
        user_id: i64,
        cutoff: DateTime<Utc>,
        categories: &[Category],
    ) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut cleaned = 0;
        for category in categories {
            cleaned += tx.execute(
                "UPDATE emails
                 SET body = NULL, snippet = '[Archived - ' || category || ']'
                 WHERE user_id = ?1 AND received_at < ?2 AND category = ?3
                   AND body IS NOT NULL",
                params![user_id, cutoff.to_rfc3339(), category.as_str()],
            )?;
        }

        tx.commit()?;
        Ok(cleaned)
    }

    fn get_sender_flag(&self, user_id: i64, sender: &str) -> Result<Option<SenderFlag>> {
        let conn = self.conn.lock().unwrap();

        let flag = conn
            .query_row(
                "SELECT id, user_id, sender, kind, risk, confidence, total_emails,
                        spam_emails, spam_ratio, first_seen, last_seen, flagged_at,
                        user_confirmed
                 FROM sender_flags WHERE user_id = ?1 AND sender = ?2",
                params![user_id, sender],
                |row| {
                    let kind: String = row.get(3)?;
                    let risk: String = row.get(4)?;
                    Ok(SenderFlag {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        sender: row.get(2)?,
                        kind: FlagKind::parse(&kind).unwrap_or(FlagKind::Spam),
                        risk: RiskTier::parse(&risk).unwrap_or(RiskTier::Low),
                        confidence: row.get::<_, f64>(5)? as f32,
                        total_emails: row.get::<_, i64>(6)? as u32,
                        spam_emails: row.get::<_, i64>(7)? as u32,
                        spam_ratio: row.get::<_, f64>(8)? as f32,
                        first_seen: parse_opt_ts(row.get(9)?),
                        last_seen: parse_opt_ts(row.get(10)?),
                        flagged_at: parse_ts(&row.get::<_, String>(11)?),
                        user_confirmed: row.get(12)?,
                    })
                },
            )
            .optional()?;

        Ok(flag)
    }

    fn upsert_sender_flag(&self, flag: SenderFlag) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO sender_flags
             (user_id, sender, kind, risk, confidence, total_emails, spam_emails,
              spam_ratio, first_seen, last_seen, flagged_at, user_confirmed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(user_id, sender) DO UPDATE SET
                kind = excluded.kind,
                risk = excluded.risk,
                confidence = excluded.confidence,
                total_emails = excluded.total_emails,
                spam_emails = excluded.spam_emails,
                spam_ratio = excluded.spam_ratio,
                first_seen = excluded.first_seen,
                last_seen = excluded.last_seen,
                user_confirmed = excluded.user_confirmed",
            params![
                flag.user_id,
                flag.sender,
                flag.kind.as_str(),
                flag.risk.as_str(),
                flag.confidence as f64,
                flag.total_emails as i64,
                flag.spam_emails as i64,
                flag.spam_ratio as f64,
                flag.first_seen.map(|t| t.to_rfc3339()),
                flag.last_seen.map(|t| t.to_rfc3339()),
                flag.flagged_at.to_rfc3339(),
                flag.user_confirmed,
            ],
        )?;

        Ok(())
    }

    fn insert_task(&self, mut task: Task) -> Result<Task> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO tasks
             (user_id, kind, description, status, steps, priority, progress,
              result, error, created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                task.user_id,
                task.kind.as_str(),
                task.description,
                task.status.as_str(),
                serde_json::to_string(&task.steps)?,
                task.priority as i64,
                task.progress as i64,
                task.result.as_ref().map(|v| v.to_string()),
                task.error,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
                task.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        task.id = conn.last_insert_rowid();
        Ok(task)
    }

    fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                "SELECT id, user_id, kind, description, status, steps, priority,
                        progress, result, error, created_at, updated_at, completed_at
                 FROM tasks WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, String>(10)?,
                        row.get::<_, String>(11)?,
                        row.get::<_, Option<String>>(12)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            id,
            user_id,
            kind,
            description,
            status,
            steps_json,
            priority,
            progress,
            result_json,
            error,
            created_at,
            updated_at,
            completed_at,
        )) = row
        else {
            return Ok(None);
        };

        let steps: Vec<TaskStep> = serde_json::from_str(&steps_json)
            .with_context(|| format!("Corrupt steps payload on task {}", id))?;
        let result = result_json
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .with_context(|| format!("Corrupt result payload on task {}", id))?;

        Ok(Some(Task {
            id,
            user_id,
            kind: TaskKind::parse(&kind).unwrap_or(TaskKind::Custom),
            description,
            status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Failed),
            steps,
            priority: priority as u8,
            progress: progress as u8,
            result,
            error,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
            completed_at: parse_opt_ts(completed_at),
        }))
    }

    fn update_task(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "UPDATE tasks SET
                status = ?1, steps = ?2, progress = ?3, result = ?4, error = ?5,
                updated_at = ?6, completed_at = ?7
             WHERE id = ?8",
            params![
                task.status.as_str(),
                serde_json::to_string(&task.steps)?,
                task.progress as i64,
                task.result.as_ref().map(|v| v.to_string()),
                task.error,
                task.updated_at.to_rfc3339(),
                task.completed_at.map(|t| t.to_rfc3339()),
                task.id,
            ],
        )?;

        Ok(())
    }

    fn create_run(&self, mut run: SyncRun) -> Result<SyncRun> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO sync_runs
             (user_id, phase, progress, stats, error, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.user_id,
                run.phase.as_str(),
                run.progress as i64,
                serde_json::to_string(&run.stats)?,
                run.error,
                run.started_at.to_rfc3339(),
                run.finished_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        run.id = conn.last_insert_rowid();
        Ok(run)
    }

    fn update_run(&self, run: &SyncRun) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "UPDATE sync_runs SET
                phase = ?1, progress = ?2, stats = ?3, error = ?4, finished_at = ?5
             WHERE id = ?6",
            params![
                run.phase.as_str(),
                run.progress as i64,
                serde_json::to_string(&run.stats)?,
                run.error,
                run.finished_at.map(|t| t.to_rfc3339()),
                run.id,
            ],
        )?;

        Ok(())
    }

    fn get_run(&self, id: i64) -> Result<Option<SyncRun>> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                "SELECT id, user_id, phase, progress, stats, error, started_at, finished_at
                 FROM sync_runs WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, user_id, phase, progress, stats_json, error, started_at, finished_at)) = row
        else {
            return Ok(None);
        };

        let stats: SyncStats = serde_json::from_str(&stats_json).unwrap_or_default();

        Ok(Some(SyncRun {
            id,
            user_id,
            phase: RunPhase::parse(&phase).unwrap_or(RunPhase::Failed),
            progress: progress as u8,
            stats,
            error,
            started_at: parse_ts(&started_at),
            finished_at: parse_opt_ts(finished_at),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmailAction, TaskKind};
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("scrapit.test.sqlite")).unwrap();
        (store, dir)
    }

    fn seeded_user(store: &SqliteStore) -> User {
        store
            .create_user(User::new("user@example.com", "sub-1").with_tokens("access", None))
            .unwrap()
    }

    fn make_email(user_id: i64, gmail_id: &str) -> EmailRecord {
        EmailRecord::builder(user_id, GmailId::new(gmail_id))
            .subject("Test subject")
            .sender("Sender <sender@example.com>")
            .recipient("user@example.com")
            .snippet("preview text")
            .body(Some("full body text".to_string()))
            .labels(vec!["INBOX".to_string(), "UNREAD".to_string()])
            .build()
    }

    #[test]
    fn test_user_roundtrip() {
        let (store, _dir) = create_test_store();
        let user = seeded_user(&store);
        assert!(user.id > 0);

        let found = store.get_user(user.id).unwrap().unwrap();
        assert_eq!(found.email, "user@example.com");
        assert_eq!(found.access_token.as_deref(), Some("access"));

        store
            .update_user_tokens(user.id, "access2", Some("refresh2"))
            .unwrap();
        let found = store.get_user(user.id).unwrap().unwrap();
        assert_eq!(found.access_token.as_deref(), Some("access2"));
        assert_eq!(found.refresh_token.as_deref(), Some("refresh2"));

        let now = Utc::now();
        store.set_last_synced(user.id, now).unwrap();
        let found = store.get_user(user.id).unwrap().unwrap();
        assert!(found.last_synced_at.is_some());
    }

    #[test]
    fn test_email_roundtrip_with_body() {
        let (store, _dir) = create_test_store();
        let user = seeded_user(&store);

        store.commit_batch(&[make_email(user.id, "g1")]).unwrap();

        let found = store
            .get_email(user.id, &GmailId::new("g1"))
            .unwrap()
            .unwrap();
        assert_eq!(found.subject, "Test subject");
        assert_eq!(found.body.as_deref(), Some("full body text"));
        assert_eq!(found.labels, vec!["INBOX", "UNREAD"]);
        assert!(found.id > 0);
        assert!(store.has_email(user.id, &GmailId::new("g1")).unwrap());
        assert!(!store.has_email(user.id, &GmailId::new("g2")).unwrap());
    }

    #[test]
    fn test_commit_batch_upsert_keeps_unique_key() {
        let (store, _dir) = create_test_store();
        let user = seeded_user(&store);

        store.commit_batch(&[make_email(user.id, "g1")]).unwrap();
        let first = store
            .get_email(user.id, &GmailId::new("g1"))
            .unwrap()
            .unwrap();

        let mut update = make_email(user.id, "g1");
        update.subject = "Replaced".to_string();
        update.labels = vec!["INBOX".to_string()];
        store.commit_batch(&[update]).unwrap();

        assert_eq!(store.count_emails(user.id).unwrap(), 1);
        let second = store
            .get_email(user.id, &GmailId::new("g1"))
            .unwrap()
            .unwrap();
        assert_eq!(second.subject, "Replaced");
        assert_eq!(second.labels, vec!["INBOX"]);
        // Row identity survives the upsert
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_latest_received_at_scoped_to_user() {
        let (store, _dir) = create_test_store();
        let user = seeded_user(&store);
        let other = store
            .create_user(User::new("other@example.com", "sub-2"))
            .unwrap();

        let older = Utc::now() - chrono::Duration::days(5);
        let newer = Utc::now() - chrono::Duration::days(1);

        let mut e1 = make_email(user.id, "g1");
        e1.received_at = older;
        let mut e2 = make_email(user.id, "g2");
        e2.received_at = newer;
        let mut e3 = make_email(other.id, "g3");
        e3.received_at = Utc::now();
        store.commit_batch(&[e1, e2, e3]).unwrap();

        let latest = store.latest_received_at(user.id).unwrap().unwrap();
        assert_eq!(latest.timestamp(), newer.timestamp());
    }

    #[test]
    fn test_classification_update() {
        let (store, _dir) = create_test_store();
        let user = seeded_user(&store);
        store.commit_batch(&[make_email(user.id, "g1")]).unwrap();

        let unprocessed = store.list_unprocessed(user.id, 10).unwrap();
        assert_eq!(unprocessed.len(), 1);

        let classification = Classification {
            category: Category::Spam,
            confidence: 0.92,
            is_spam: true,
            spam_score: 0.85,
            spam_reason: Some("keyword match".to_string()),
            sender_risk: RiskTier::High,
        };
        store
            .apply_classification(user.id, &GmailId::new("g1"), &classification)
            .unwrap();

        let found = store
            .get_email(user.id, &GmailId::new("g1"))
            .unwrap()
            .unwrap();
        assert_eq!(found.category, Some(Category::Spam));
        assert!(found.is_spam);
        assert!(found.is_processed);
        assert_eq!(found.sender_risk, Some(RiskTier::High));

        assert!(store.list_unprocessed(user.id, 10).unwrap().is_empty());
    }

    #[test]
    fn test_flag_and_label_mutations() {
        let (store, _dir) = create_test_store();
        let user = seeded_user(&store);
        store.commit_batch(&[make_email(user.id, "g1")]).unwrap();

        store
            .update_email_labels(user.id, &GmailId::new("g1"), &["TRASH".to_string()])
            .unwrap();
        store.mark_deleted(user.id, &GmailId::new("g1")).unwrap();

        let found = store
            .get_email(user.id, &GmailId::new("g1"))
            .unwrap()
            .unwrap();
        assert_eq!(found.labels, vec!["TRASH"]);
        assert!(found.is_deleted);

        store.remove_email(user.id, &GmailId::new("g1")).unwrap();
        assert!(!store.has_email(user.id, &GmailId::new("g1")).unwrap());
    }

    #[test]
    fn test_clear_old_bodies() {
        let (store, _dir) = create_test_store();
        let user = seeded_user(&store);

        let mut promo = make_email(user.id, "g1");
        promo.received_at = Utc::now() - chrono::Duration::days(200);
        promo.category = Some(Category::Promotional);
        let mut work = make_email(user.id, "g2");
        work.received_at = Utc::now() - chrono::Duration::days(200);
        work.category = Some(Category::Work);
        store.commit_batch(&[promo, work]).unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(90);
        let cleaned = store
            .clear_old_bodies(user.id, cutoff, &[Category::Promotional])
            .unwrap();
        assert_eq!(cleaned, 1);

        let promo = store
            .get_email(user.id, &GmailId::new("g1"))
            .unwrap()
            .unwrap();
        assert!(promo.body.is_none());
        assert_eq!(promo.snippet, "[Archived - promotional]");
    }

    #[test]
    fn test_sender_flag_upsert() {
        let (store, _dir) = create_test_store();
        let user = seeded_user(&store);

        let mut flag = SenderFlag::new(user.id, "noreply@deals.example", FlagKind::Spam);
        flag.record_observation(true, Utc::now());
        store.upsert_sender_flag(flag.clone()).unwrap();

        flag.record_observation(true, Utc::now());
        store.upsert_sender_flag(flag).unwrap();

        let found = store
            .get_sender_flag(user.id, "noreply@deals.example")
            .unwrap()
            .unwrap();
        assert_eq!(found.total_emails, 2);
        assert_eq!(found.risk, RiskTier::High);
    }

    #[test]
    fn test_task_roundtrip() {
        let (store, _dir) = create_test_store();
        let user = seeded_user(&store);

        let steps = vec![TaskStep::new(EmailAction::Archive {
            message_ids: vec![GmailId::new("g1")],
        })];
        let task = store
            .insert_task(Task::new(user.id, TaskKind::EmailCleanup, "archive one", steps))
            .unwrap();
        assert!(task.id > 0);

        let mut loaded = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(loaded.kind, TaskKind::EmailCleanup);
        assert_eq!(loaded.steps.len(), 1);

        loaded.status = TaskStatus::Completed;
        loaded.progress = 100;
        loaded.steps[0].completed = true;
        loaded.completed_at = Some(Utc::now());
        store.update_task(&loaded).unwrap();

        let reloaded = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Completed);
        assert!(reloaded.steps[0].completed);
        assert!(reloaded.completed_at.is_some());
    }

    #[test]
    fn test_run_roundtrip() {
        let (store, _dir) = create_test_store();
        let user = seeded_user(&store);

        let run = store.create_run(SyncRun::new(user.id)).unwrap();
        assert!(run.id > 0);
        assert_eq!(run.phase, RunPhase::NotStarted);

        let mut run = run;
        run.checkpoint(
            RunPhase::Processing,
            50,
            SyncStats {
                total: 100,
                processed: 50,
                new: 40,
                updated: 10,
                failed: 0,
                batches: 1,
            },
        );
        store.update_run(&run).unwrap();

        let found = store.get_run(run.id).unwrap().unwrap();
        assert_eq!(found.phase, RunPhase::Processing);
        assert_eq!(found.stats.new, 40);

        run.complete(run.stats);
        store.update_run(&run).unwrap();
        let found = store.get_run(run.id).unwrap().unwrap();
        assert_eq!(found.phase, RunPhase::Completed);
        assert_eq!(found.progress, 100);
    }
}
