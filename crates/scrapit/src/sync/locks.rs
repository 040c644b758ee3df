//! Per-user sync mutual exclusion
//!
//! Two concurrent runs for the same user would race on the same unique-key
//! upserts, so a run must hold the user's permit for its whole duration.
//! A second acquisition attempt is rejected, not queued.

use std::collections::HashSet;
use std::sync::Mutex;

/// Registry of users with a sync currently in flight
#[derive(Debug, Default)]
pub struct SyncLocks {
    active: Mutex<HashSet<i64>>,
}

impl SyncLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the sync permit for a user.
    ///
    /// Returns None when a run already holds it. The permit releases on drop.
    pub fn try_acquire(&self, user_id: i64) -> Option<SyncPermit<'_>> {
        let mut active = self.active.lock().unwrap();
        if active.insert(user_id) {
            Some(SyncPermit {
                locks: self,
                user_id,
            })
        } else {
            None
        }
    }

    /// Whether a sync is currently running for the user
    pub fn is_locked(&self, user_id: i64) -> bool {
        self.active.lock().unwrap().contains(&user_id)
    }

    fn release(&self, user_id: i64) {
        self.active.lock().unwrap().remove(&user_id);
    }
}

/// Held for the duration of a sync run; releases the user's slot on drop
#[derive(Debug)]
pub struct SyncPermit<'a> {
    locks: &'a SyncLocks,
    user_id: i64,
}

impl Drop for SyncPermit<'_> {
    fn drop(&mut self) {
        self.locks.release(self.user_id);
    }
}
