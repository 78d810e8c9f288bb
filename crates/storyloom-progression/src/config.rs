//! Engine configuration.

use std::time::Duration;

/// Tunables for the progression engine.
#[derive(Debug, Clone)]
pub struct ProgressionConfig {
    /// Lower bound for a deadline recomputed after a phase-duration change.
    pub min_remaining: Duration,
    /// Number of shards in the per-story lock table.
    pub lock_shards: usize,
    /// Number of shards in the timer registry.
    pub timer_shards: usize,
    /// Proposal phase length for stories created without one.
    pub default_proposal_time_ms: i64,
    /// Voting phase length for stories created without one.
    pub default_voting_time_ms: i64,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            min_remaining: Duration::from_millis(1_000),
            lock_shards: 16,
            timer_shards: 16,
            default_proposal_time_ms: 86_400_000,
            default_voting_time_ms: 86_400_000,
        }
    }
}
