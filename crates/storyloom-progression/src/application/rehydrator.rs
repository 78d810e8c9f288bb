//! Startup rehydration.
//!
//! Timers live only in memory. On boot, every story with a stored deadline
//! gets its timer back: future deadlines are re-armed for the time left and
//! deadlines that passed while the process was down are resolved on the spot.

use serde::Serialize;
use storyloom_core::error::DomainError;
use storyloom_core::model::{Phase, Story};
use tracing::{error, info, warn};

use crate::application::orchestrator::{DeadlineOutcome, Orchestrator};
use crate::domain::phase;
use crate::timers::TimerKind;

/// Summary of one rehydration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RehydrationReport {
    /// Stories with at least one stored deadline.
    pub scanned: usize,
    /// Timers re-armed for a future deadline.
    pub armed: usize,
    /// Overdue phases resolved during the pass.
    pub resolved: usize,
    /// Stories whose deadline did not match their phase.
    pub skipped: usize,
    /// Stories whose resolution failed; their deadlines are kept.
    pub failed: usize,
}

enum Restored {
    Armed,
    Resolved,
    Skipped,
}

/// Restores the timers of every story with a pending deadline.
///
/// A failure on one story is logged and counted but does not stop the pass.
///
/// # Errors
///
/// Returns an error only if the list of stories cannot be read.
pub async fn rehydrate(engine: &Orchestrator) -> Result<RehydrationReport, DomainError> {
    let stories = engine.store().stories_with_deadlines().await?;
    let mut report = RehydrationReport {
        scanned: stories.len(),
        ..RehydrationReport::default()
    };

    for story in &stories {
        match restore(engine, story).await {
            Ok(Restored::Armed) => report.armed += 1,
            Ok(Restored::Resolved) => report.resolved += 1,
            Ok(Restored::Skipped) => report.skipped += 1,
            Err(err) => {
                error!(story_id = %story.id, error = %err, "failed to rehydrate story");
                report.failed += 1;
            }
        }
    }

    info!(
        scanned = report.scanned,
        armed = report.armed,
        resolved = report.resolved,
        skipped = report.skipped,
        failed = report.failed,
        "timers rehydrated"
    );
    Ok(report)
}

async fn restore(engine: &Orchestrator, story: &Story) -> Result<Restored, DomainError> {
    let (kind, deadline) = match (story.current_phase, story.proposal_deadline, story.voting_deadline) {
        (Phase::Proposal, Some(deadline), None) => (TimerKind::Proposal, deadline),
        (Phase::Voting, None, Some(deadline)) => (TimerKind::Voting, deadline),
        _ => {
            warn!(
                story_id = %story.id,
                phase = %story.current_phase,
                proposal_deadline = ?story.proposal_deadline,
                voting_deadline = ?story.voting_deadline,
                "stored deadline does not match the story's phase, skipping"
            );
            return Ok(Restored::Skipped);
        }
    };

    if let Some(remaining) = phase::remaining_until(deadline, engine.clock().now()) {
        engine.arm_timer(story.id, kind, phase::to_delay(remaining));
        return Ok(Restored::Armed);
    }

    let outcome = match kind {
        TimerKind::Proposal => engine.on_proposal_deadline(story.id).await?,
        TimerKind::Voting => engine.on_voting_deadline(story.id).await?,
    };
    Ok(match outcome {
        DeadlineOutcome::Resolved => Restored::Resolved,
        DeadlineOutcome::Rearmed => Restored::Armed,
        DeadlineOutcome::Stale => Restored::Skipped,
    })
}
