//! ScrapIt core - email management backend logic
//!
//! This crate provides the provider-independent core of the ScrapIt email
//! manager:
//! - Domain models (User, EmailRecord, SenderFlag, Task, SyncRun)
//! - Gmail API client with per-user token refresh
//! - Storage trait abstractions over SQLite and in-memory backends
//! - The idempotent chunk-committed sync engine
//! - Bulk email actions and multi-step task execution
//! - Schema-validated model classification with rule-based spam scoring
//!
//! The HTTP serving layer, OAuth callback flow, and chat assistant live
//! outside this crate and consume it through the public API below.

pub mod actions;
pub mod classify;
pub mod config;
pub mod gmail;
pub mod maintenance;
pub mod models;
pub mod storage;
pub mod sync;
pub mod tasks;

pub use actions::{ActionExecutor, ActionOutcome};
pub use classify::{
    ClassifyStats, CompletionBackend, OpenAiBackend, classify_email, classify_unprocessed,
};
pub use config::{GoogleCredentials, LlmCredentials};
pub use gmail::{ApiError, FetchedMessage, GmailAuth, GmailClient, MailApi, UserTokens};
pub use maintenance::clear_old_bodies;
pub use models::{
    Category, Classification, EmailAction, EmailRecord, FlagKind, GmailId, RiskTier, RunPhase,
    SenderFlag, SyncRun, SyncStats, Task, TaskKind, TaskStatus, TaskStep, User,
};
pub use storage::{EmailStore, InMemoryStore, SqliteStore};
pub use sync::{
    DEFAULT_BATCH_SIZE, DEFAULT_SYNC_DAYS, SyncLocks, SyncMode, SyncOptions, SyncReport, run_sync,
};
pub use tasks::run_task;
