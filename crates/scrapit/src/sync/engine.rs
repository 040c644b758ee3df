//! The sync run pipeline
//!
//! One run flows through four stages: list matching message IDs (following
//! pagination), fetch each message, reconcile it against the local store,
//! and commit in fixed-size chunks. Fetches are sequential with small fixed
//! delays to stay inside provider rate limits.
//!
//! Failure handling follows a strict split: authentication failure aborts
//! before listing, per-message fetch problems are tallied and skipped, and a
//! chunk commit failure ends the run with the partial stats accumulated so
//! far. The entry point never panics or unwinds for these cases; callers
//! check the returned report.

use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};

use super::locks::SyncLocks;
use super::query::{full_query, incremental_query, progress_percent};
use super::reconcile::{Disposition, SeenIds, merge_fetched};
use crate::gmail::{GmailClient, MailApi, normalize_message};
use crate::models::{EmailRecord, GmailId, RunPhase, SyncRun, SyncStats};
use crate::storage::EmailStore;

/// Messages fetched and committed per chunk by default
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Trailing window for a full sync, and the incremental fallback
pub const DEFAULT_SYNC_DAYS: u32 = 30;

/// What part of the mailbox a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Everything in a trailing window of days
    Full { days_back: u32 },
    /// Only messages after the latest locally stored received date,
    /// falling back to a full window when the store is empty
    Incremental { fallback_days: u32 },
}

/// Tuning knobs for a sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: SyncMode,
    /// Explicit listing query; overrides `mode` when set
    pub query: Option<String>,
    /// Chunk size for fetch+commit; also the listing page size
    pub batch_size: usize,
    /// Stop listing after this many IDs
    pub max_messages: Option<usize>,
    /// Pause between individual message fetches
    pub fetch_delay: Duration,
    /// Pause between committed chunks
    pub chunk_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::Incremental {
                fallback_days: DEFAULT_SYNC_DAYS,
            },
            query: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_messages: None,
            fetch_delay: Duration::from_millis(50),
            chunk_delay: Duration::from_millis(500),
        }
    }
}

/// Outcome of a sync run.
///
/// Failures surface here as `success = false` with an error string, never as
/// a panic or error return; `stats` carries whatever was durably committed
/// before the failure.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub success: bool,
    pub error: Option<String>,
    /// The persisted run row, when one was created
    pub run_id: Option<i64>,
    pub stats: SyncStats,
}

impl SyncReport {
    fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            run_id: None,
            stats: SyncStats::default(),
        }
    }

    fn from_run(run: &SyncRun) -> Self {
        Self {
            success: run.phase == RunPhase::Completed,
            error: run.error.clone(),
            run_id: Some(run.id),
            stats: run.stats,
        }
    }
}

/// Execute one sync run for a user.
///
/// Holds the user's sync permit for the whole run; a second concurrent run
/// for the same user is rejected immediately. `on_progress` is invoked after
/// each chunk with the capped percentage and the running stats; percentages
/// are non-decreasing over a run.
pub fn run_sync<F>(
    api: &dyn MailApi,
    store: &dyn EmailStore,
    locks: &SyncLocks,
    user_id: i64,
    options: &SyncOptions,
    mut on_progress: F,
) -> SyncReport
where
    F: FnMut(u8, &SyncStats),
{
    let Some(_permit) = locks.try_acquire(user_id) else {
        warn!("Rejecting sync for user {}: a run is already active", user_id);
        return SyncReport::rejected("Sync already running for this user");
    };

    let mut run = match store.create_run(SyncRun::new(user_id)) {
        Ok(run) => run,
        Err(e) => {
            error!("Failed to create sync run for user {}: {}", user_id, e);
            return SyncReport::rejected(format!("Failed to record sync run: {}", e));
        }
    };

    info!("Starting sync run {} for user {}", run.id, user_id);

    // Authentication failure is fatal before any listing happens
    if !api.authenticate() {
        run.fail("Authentication failed", SyncStats::default());
        persist_run(store, &run);
        return SyncReport::from_run(&run);
    }

    let query = match build_query(store, user_id, options) {
        Ok(query) => query,
        Err(e) => {
            run.fail(
                format!("Failed to build sync query: {}", e),
                SyncStats::default(),
            );
            persist_run(store, &run);
            return SyncReport::from_run(&run);
        }
    };

    let mut stats = SyncStats::default();
    run.checkpoint(RunPhase::Listing, 0, stats);
    persist_run(store, &run);

    let page_size = options.batch_size.clamp(1, GmailClient::MAX_PAGE_SIZE);
    let ids = list_message_ids(api, &query, page_size, options.max_messages);
    stats.total = ids.len();

    info!(
        "Run {}: listed {} messages for query '{}'",
        run.id,
        ids.len(),
        query
    );

    if ids.is_empty() {
        run.complete(stats);
        persist_run(store, &run);
        touch_last_synced(store, user_id);
        return SyncReport::from_run(&run);
    }

    let chunk_size = options.batch_size.max(1);
    for (chunk_index, chunk) in ids.chunks(chunk_size).enumerate() {
        if chunk_index > 0 && !options.chunk_delay.is_zero() {
            std::thread::sleep(options.chunk_delay);
        }

        let mut staged: Vec<EmailRecord> = Vec::with_capacity(chunk.len());
        let mut chunk_new = 0usize;
        let mut chunk_updated = 0usize;
        let mut chunk_failed = 0usize;

        for id in chunk {
            match fetch_and_merge(api, store, user_id, id) {
                Ok((record, Disposition::New)) => {
                    chunk_new += 1;
                    staged.push(record);
                }
                Ok((record, Disposition::Updated)) => {
                    chunk_updated += 1;
                    staged.push(record);
                }
                Ok((_, Disposition::Unchanged)) => {}
                Err(e) => {
                    warn!("Run {}: skipping message {}: {}", run.id, id, e);
                    chunk_failed += 1;
                }
            }

            if !options.fetch_delay.is_zero() {
                std::thread::sleep(options.fetch_delay);
            }
        }

        stats.processed += chunk.len();
        stats.failed += chunk_failed;

        match store.commit_batch(&staged) {
            Ok(()) => {
                stats.new += chunk_new;
                stats.updated += chunk_updated;
                stats.batches += 1;
            }
            Err(e) => {
                // The transaction rolled back: every record in this chunk
                // that wasn't already a fetch failure counts as failed, and
                // the remaining chunks are not attempted
                stats.failed += chunk.len() - chunk_failed;
                let percent = progress_percent(stats.processed, stats.total);
                on_progress(percent, &stats);
                run.fail(format!("Batch commit failed: {}", e), stats);
                persist_run(store, &run);
                error!("Run {} aborted: {}", run.id, e);
                return SyncReport::from_run(&run);
            }
        }

        let percent = progress_percent(stats.processed, stats.total);
        on_progress(percent, &stats);
        run.checkpoint(RunPhase::Processing, percent, stats);
        persist_run(store, &run);
    }

    run.complete(stats);
    persist_run(store, &run);
    touch_last_synced(store, user_id);

    info!(
        "Run {} completed: {} new, {} updated, {} failed over {} batches",
        run.id, stats.new, stats.updated, stats.failed, stats.batches
    );
    SyncReport::from_run(&run)
}

/// Resolve the listing query for a run
fn build_query(
    store: &dyn EmailStore,
    user_id: i64,
    options: &SyncOptions,
) -> anyhow::Result<String> {
    if let Some(query) = &options.query {
        return Ok(query.clone());
    }

    match options.mode {
        SyncMode::Full { days_back } => Ok(full_query(days_back)),
        SyncMode::Incremental { fallback_days } => {
            let latest = store.latest_received_at(user_id)?;
            Ok(incremental_query(latest, fallback_days))
        }
    }
}

/// List all matching message IDs, following pagination.
///
/// Duplicate IDs within the run are dropped (first occurrence wins). Rate
/// limits are retried inside the client; any listing error that survives
/// stops the listing and whatever accumulated so far is returned.
fn list_message_ids(
    api: &dyn MailApi,
    query: &str,
    page_size: usize,
    max_messages: Option<usize>,
) -> Vec<String> {
    let mut seen = SeenIds::new();
    let mut ids: Vec<String> = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        if let Some(cap) = max_messages
            && ids.len() >= cap
        {
            break;
        }

        match api.list_messages(Some(query), page_size, page_token.as_deref()) {
            Ok(page) => {
                for msg_ref in page.messages.unwrap_or_default() {
                    if seen.insert(&msg_ref.id) {
                        ids.push(msg_ref.id);
                    }
                }
                match page.next_page_token {
                    Some(token) => page_token = Some(token),
                    None => break,
                }
            }
            Err(e) => {
                warn!("Listing aborted after {} ids: {}", ids.len(), e);
                break;
            }
        }
    }

    if let Some(cap) = max_messages {
        ids.truncate(cap);
    }
    ids
}

/// Fetch one message and reconcile it against the local record
fn fetch_and_merge(
    api: &dyn MailApi,
    store: &dyn EmailStore,
    user_id: i64,
    id: &str,
) -> anyhow::Result<(EmailRecord, Disposition)> {
    let message = api.get_message(id)?;
    let fetched = normalize_message(&message)?;
    let existing = store.get_email(user_id, &GmailId::new(id))?;
    Ok(merge_fetched(user_id, &fetched, existing))
}

fn persist_run(store: &dyn EmailStore, run: &SyncRun) {
    if let Err(e) = store.update_run(run) {
        warn!("Failed to persist checkpoint for run {}: {}", run.id, e);
    }
}

fn touch_last_synced(store: &dyn EmailStore, user_id: i64) {
    if let Err(e) = store.set_last_synced(user_id, Utc::now()) {
        warn!("Failed to update last sync time for user {}: {}", user_id, e);
    }
}
