//! Sync run status records
//!
//! Each sync run is tracked as a persisted row rather than process memory,
//! so progress polling works across workers and survives restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a sync run
///
/// A run moves strictly forward: NotStarted -> Listing -> Processing ->
/// Completed or Failed. There is no paused or cancelled phase; the loop runs
/// to completion or to its first fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    NotStarted,
    Listing,
    Processing,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::NotStarted => "not_started",
            RunPhase::Listing => "listing",
            RunPhase::Processing => "processing",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(RunPhase::NotStarted),
            "listing" => Some(RunPhase::Listing),
            "processing" => Some(RunPhase::Processing),
            "completed" => Some(RunPhase::Completed),
            "failed" => Some(RunPhase::Failed),
            _ => None,
        }
    }
}

/// Running counters accumulated over a sync run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Messages the run set out to process (listed, after in-run dedup)
    pub total: usize,
    /// Messages fetched and examined (duplicates excluded)
    pub processed: usize,
    /// Records created
    pub new: usize,
    /// Records whose provider-authoritative fields changed
    pub updated: usize,
    /// Messages that failed to fetch or commit
    pub failed: usize,
    /// Chunks committed
    pub batches: usize,
}

/// One sync run, persisted at start and checkpointed after each chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    /// Unique integer identifier (database primary key, 0 until stored)
    pub id: i64,
    /// User the run belongs to
    pub user_id: i64,
    pub phase: RunPhase,
    /// 0-100
    pub progress: u8,
    pub stats: SyncStats,
    /// Error message for failed runs
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    /// Create a run record in its initial phase (id assigned by the database)
    pub fn new(user_id: i64) -> Self {
        Self {
            id: 0,
            user_id,
            phase: RunPhase::NotStarted,
            progress: 0,
            stats: SyncStats::default(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Checkpoint the run mid-flight
    pub fn checkpoint(&mut self, phase: RunPhase, progress: u8, stats: SyncStats) {
        self.phase = phase;
        self.progress = progress.min(100);
        self.stats = stats;
    }

    /// Mark the run completed
    pub fn complete(&mut self, stats: SyncStats) {
        self.phase = RunPhase::Completed;
        self.progress = 100;
        self.stats = stats;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the run failed, keeping whatever stats accumulated
    pub fn fail(&mut self, error: impl Into<String>, stats: SyncStats) {
        self.phase = RunPhase::Failed;
        self.stats = stats;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_lifecycle() {
        let mut run = SyncRun::new(1);
        assert_eq!(run.phase, RunPhase::NotStarted);
        assert!(run.finished_at.is_none());

        run.checkpoint(RunPhase::Processing, 40, SyncStats::default());
        assert_eq!(run.phase, RunPhase::Processing);
        assert_eq!(run.progress, 40);

        let stats = SyncStats {
            total: 10,
            processed: 10,
            new: 10,
            ..Default::default()
        };
        run.complete(stats);
        assert_eq!(run.phase, RunPhase::Completed);
        assert_eq!(run.progress, 100);
        assert!(run.finished_at.is_some());
        assert!(run.phase.is_terminal());
    }

    #[test]
    fn test_checkpoint_caps_progress() {
        let mut run = SyncRun::new(1);
        run.checkpoint(RunPhase::Processing, 150, SyncStats::default());
        assert_eq!(run.progress, 100);
    }

    #[test]
    fn test_fail_keeps_partial_stats() {
        let mut run = SyncRun::new(1);
        let stats = SyncStats {
            processed: 5,
            failed: 5,
            ..Default::default()
        };
        run.fail("commit failed", stats);
        assert_eq!(run.phase, RunPhase::Failed);
        assert_eq!(run.stats.failed, 5);
        assert_eq!(run.error.as_deref(), Some("commit failed"));
    }
}
