//! Gmail-to-local synchronization
//!
//! Reconciliation is idempotent on the (user, gmail_id) key, so re-running
//! a sync over already-seen messages is always safe.

mod engine;
mod locks;
mod query;
mod reconcile;

pub use engine::{
    DEFAULT_BATCH_SIZE, DEFAULT_SYNC_DAYS, SyncMode, SyncOptions, SyncReport, run_sync,
};
pub use locks::{SyncLocks, SyncPermit};
pub use query::{after_query, full_query, incremental_query, progress_percent};
pub use reconcile::{Disposition, SeenIds, merge_fetched};
