//! Storage maintenance
//!
//! Old low-value email bodies are the bulk of stored data; blanking them
//! keeps the store small without losing the metadata rows.

use anyhow::Result;
use chrono::{Duration, Utc};
use log::info;

use crate::models::Category;
use crate::storage::EmailStore;

/// Categories whose old bodies are safe to drop
const LOW_VALUE_CATEGORIES: &[Category] =
    &[Category::Promotional, Category::Newsletter, Category::Spam];

/// Default age threshold for body cleanup
pub const DEFAULT_CLEANUP_DAYS: u32 = 90;

/// Blank stored bodies for a user's old promotional/newsletter/spam emails.
///
/// Only the body content is removed; the row, its metadata, and its
/// classification stay intact. Returns how many records were cleaned.
pub fn clear_old_bodies(store: &dyn EmailStore, user_id: i64, days_old: u32) -> Result<usize> {
    let cutoff = Utc::now() - Duration::days(days_old as i64);
    let cleaned = store.clear_old_bodies(user_id, cutoff, LOW_VALUE_CATEGORIES)?;

    info!(
        "Cleaned {} email bodies older than {} days for user {}",
        cleaned, days_old, user_id
    );
    Ok(cleaned)
}
