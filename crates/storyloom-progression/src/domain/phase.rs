//! Phase rules for a story's round.
//!
//! Everything here is pure: the caller supplies the story, the round's
//! records, the current time and a random source, and receives the records to
//! write back. No function performs I/O.

use chrono::{DateTime, TimeDelta, Utc};
use storyloom_core::error::DomainError;
use storyloom_core::model::{
    Chapter, ChapterProposal, Collaborator, CollaboratorRole, Phase, Story,
};
use storyloom_core::rng::DeterministicRng;
use storyloom_core::store::StoreChange;
use uuid::Uuid;

/// Number of open proposals at which the proposal phase becomes time-bounded.
pub const PROPOSALS_TO_ARM: usize = 2;

/// Longest accepted phase length: 365 days.
pub const MAX_PHASE_TIME_MS: i64 = 365 * 24 * 60 * 60 * 1_000;

fn out_of_range() -> DomainError {
    DomainError::Infrastructure("phase deadline is out of the representable range".to_owned())
}

/// `start + duration`, failing instead of overflowing.
///
/// # Errors
///
/// `Infrastructure` when the sum leaves the representable time range, which
/// only a corrupt stored duration can cause.
pub fn deadline_after(
    start: DateTime<Utc>,
    duration: TimeDelta,
) -> Result<DateTime<Utc>, DomainError> {
    start.checked_add_signed(duration).ok_or_else(out_of_range)
}

/// What the engine should do after a proposal was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionDecision {
    /// `true` when the proposal deadline must be set and its timer armed.
    pub should_arm_proposal_timer: bool,
}

/// Decides whether a submission arms the proposal timer.
///
/// Arming happens once per round, exactly when the open count reaches two:
/// a lone proposal cannot be forced to a vote, and later submissions never
/// push the deadline back.
#[must_use]
pub fn on_proposal_submitted(open_proposal_count: usize) -> SubmissionDecision {
    SubmissionDecision {
        should_arm_proposal_timer: open_proposal_count == PROPOSALS_TO_ARM,
    }
}

/// Sets the proposal deadline `proposal_time_ms` from `now`.
///
/// # Errors
///
/// See [`deadline_after`].
pub fn open_proposal_window(story: &Story, now: DateTime<Utc>) -> Result<Story, DomainError> {
    Ok(Story {
        proposal_deadline: Some(deadline_after(now, story.proposal_duration())?),
        voting_deadline: None,
        ..story.clone()
    })
}

/// Clears the proposal deadline after the round fell below two proposals.
#[must_use]
pub fn close_proposal_window(story: &Story) -> Story {
    Story {
        proposal_deadline: None,
        ..story.clone()
    }
}

/// Ends the proposal phase and opens voting. No winner is chosen here.
///
/// # Errors
///
/// See [`deadline_after`].
pub fn resolve_proposal_phase(story: &Story, now: DateTime<Utc>) -> Result<Story, DomainError> {
    Ok(Story {
        current_phase: Phase::Voting,
        proposal_deadline: None,
        voting_deadline: Some(deadline_after(now, story.voting_duration())?),
        ..story.clone()
    })
}

/// Picks the round's winner.
///
/// Returns `None` for an empty round. With no votes cast at all, the winner is
/// drawn uniformly from `rng`. Otherwise the highest tally wins and equal top
/// tallies go to the lowest proposal id.
pub fn select_winner<'a>(
    proposals: &'a [ChapterProposal],
    rng: &mut dyn DeterministicRng,
) -> Option<&'a ChapterProposal> {
    if proposals.is_empty() {
        return None;
    }

    let total_votes: i64 = proposals.iter().map(|p| i64::from(p.vote_count)).sum();
    if total_votes == 0 {
        let max_index = u32::try_from(proposals.len() - 1).unwrap_or(u32::MAX);
        let drawn = rng.next_u32_range(0, max_index);
        let index = usize::try_from(drawn).unwrap_or(0);
        return proposals.get(index).or_else(|| proposals.last());
    }

    proposals
        .iter()
        .max_by(|a, b| a.vote_count.cmp(&b.vote_count).then_with(|| b.id.cmp(&a.id)))
}

/// Records produced by closing a voting round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResolution {
    /// The story reset to PROPOSAL with both deadlines cleared.
    pub story: Story,
    /// The previous tip of the chain, which loses `is_last_chapter`.
    pub demoted_chapter_id: Option<Uuid>,
    /// The chapter materialized from the winner.
    pub new_chapter: Option<Chapter>,
    /// The winner's author, when not yet a collaborator.
    pub new_collaborator: Option<Collaborator>,
}

impl RoundResolution {
    /// The change batch that commits this resolution. The round's proposals
    /// and votes are always discarded.
    #[must_use]
    pub fn changes(&self) -> Vec<StoreChange> {
        let mut changes = vec![StoreChange::UpdateStory(self.story.clone())];
        if let Some(chapter) = &self.new_chapter {
            // The old tip is demoted first so exactly one chapter stays last.
            if let Some(chapter_id) = self.demoted_chapter_id {
                changes.push(StoreChange::DemoteChapter(chapter_id));
            }
            changes.push(StoreChange::InsertChapter(chapter.clone()));
        }
        if let Some(collaborator) = &self.new_collaborator {
            changes.push(StoreChange::AddCollaborator(collaborator.clone()));
        }
        changes.push(StoreChange::ClearRound);
        changes
    }
}

/// Closes the round.
///
/// With a winner, its text becomes the chapter after `last_chapter` and its
/// author joins as a USER collaborator unless `winner_is_collaborator`.
/// Without one, the story is only reset to PROPOSAL.
#[must_use]
pub fn resolve_voting_phase(
    story: &Story,
    last_chapter: Option<&Chapter>,
    winner: Option<&ChapterProposal>,
    winner_is_collaborator: bool,
    new_chapter_id: Uuid,
    now: DateTime<Utc>,
) -> RoundResolution {
    let reset = Story {
        current_phase: Phase::Proposal,
        proposal_deadline: None,
        voting_deadline: None,
        ..story.clone()
    };

    let Some(winner) = winner else {
        return RoundResolution {
            story: reset,
            demoted_chapter_id: None,
            new_chapter: None,
            new_collaborator: None,
        };
    };

    let chapter = Chapter {
        id: new_chapter_id,
        story_id: story.id,
        author_id: winner.author_id,
        title: winner.title.clone(),
        content: winner.content.clone(),
        position: last_chapter.map_or(1, |c| c.position + 1),
        is_last_chapter: true,
        created_at: now,
    };

    let new_collaborator = (!winner_is_collaborator).then(|| Collaborator {
        story_id: story.id,
        user_id: winner.author_id,
        role: CollaboratorRole::User,
    });

    RoundResolution {
        story: reset,
        demoted_chapter_id: last_chapter.map(|c| c.id),
        new_chapter: Some(chapter),
        new_collaborator,
    }
}

/// Recomputes a running deadline after its phase length changed.
///
/// The phase started at `old_deadline - old_duration`; the new deadline keeps
/// that start and applies `new_duration`, but never lands less than `floor`
/// after `now`.
///
/// # Errors
///
/// `Infrastructure` if any intermediate instant leaves the representable
/// time range.
pub fn recompute_deadline(
    old_deadline: DateTime<Utc>,
    old_duration: TimeDelta,
    new_duration: TimeDelta,
    now: DateTime<Utc>,
    floor: TimeDelta,
) -> Result<DateTime<Utc>, DomainError> {
    let phase_started = old_deadline
        .checked_sub_signed(old_duration)
        .ok_or_else(out_of_range)?;
    let elapsed = now.signed_duration_since(phase_started);
    let remaining = new_duration
        .checked_sub(&elapsed)
        .ok_or_else(out_of_range)?
        .max(floor);
    deadline_after(now, remaining)
}

/// Time left until `deadline`, or `None` if it has passed.
#[must_use]
pub fn remaining_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Option<TimeDelta> {
    let remaining = deadline - now;
    (remaining > TimeDelta::zero()).then_some(remaining)
}

/// Converts a non-negative delta to a timer delay; negative deltas become zero.
#[must_use]
pub fn to_delay(delta: TimeDelta) -> std::time::Duration {
    delta.to_std().unwrap_or_default()
}
