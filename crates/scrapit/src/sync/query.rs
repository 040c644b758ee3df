//! Sync listing-query construction and progress math
//!
//! Pure functions, kept separate from the engine so the query format and
//! percentage behavior are testable without a provider.

use chrono::{DateTime, Duration, Utc};

/// Build a Gmail search filter matching messages after the given instant.
///
/// Gmail's `after:` operator has day granularity, so a sync starting from the
/// stored latest received date re-lists that day's messages; reconciliation
/// upserts make the overlap harmless.
pub fn after_query(after: DateTime<Utc>) -> String {
    format!("after:{}", after.format("%Y/%m/%d"))
}

/// Query for an incremental sync.
///
/// Uses the latest locally stored received date when there is one, otherwise
/// falls back to a fixed window ending now.
pub fn incremental_query(
    latest_received: Option<DateTime<Utc>>,
    fallback_days: u32,
) -> String {
    match latest_received {
        Some(latest) => after_query(latest),
        None => full_query(fallback_days),
    }
}

/// Query for a full sync over a trailing window of days
pub fn full_query(days_back: u32) -> String {
    after_query(Utc::now() - Duration::days(days_back as i64))
}

/// Progress percentage for a partially processed run, capped at 100.
///
/// An empty run is complete by definition, so zero total reports 100.
pub fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed * 100) / total).min(100) as u8
}
