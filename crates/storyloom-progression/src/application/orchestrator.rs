//! Progression orchestrator.
//!
//! Glues the phase rules, the store and the timer registry. Every operation
//! on a story runs under that story's lock. Store writes happen first, as one
//! atomic change batch; timers are armed or cancelled only after the batch
//! committed, so a failed write leaves both the store and the timers as they
//! were.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::TimeDelta;
use storyloom_core::clock::Clock;
use storyloom_core::command::Command;
use storyloom_core::error::DomainError;
use storyloom_core::model::{
    Chapter, ChapterProposal, Collaborator, CollaboratorRole, Phase, Story, Vote,
};
use storyloom_core::rng::DeterministicRng;
use storyloom_core::store::{StoreChange, StoryStore};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::ProgressionConfig;
use crate::domain::commands::{
    CastVote, ChangePhaseDurations, CreateStory, EditProposal, RetractVote, SelectWinner,
    SubmitProposal, WithdrawProposal,
};
use crate::domain::phase::{self, MAX_PHASE_TIME_MS, PROPOSALS_TO_ARM, RoundResolution};
use crate::locks::StoryLocks;
use crate::timers::{TimerKind, TimerRegistry};

/// What a deadline handler did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineOutcome {
    /// The phase ended and the store was updated.
    Resolved,
    /// The stored deadline lies in the future; the timer was re-armed for it.
    Rearmed,
    /// The story is no longer in the phase this deadline belonged to.
    Stale,
}

/// Drives stories through their rounds.
pub struct Orchestrator {
    store: Arc<dyn StoryStore>,
    clock: Arc<dyn Clock>,
    rng: Arc<Mutex<dyn DeterministicRng>>,
    timers: TimerRegistry,
    locks: StoryLocks,
    config: ProgressionConfig,
    this: Weak<Orchestrator>,
}

fn log_command(command: &dyn Command) {
    info!(
        command_type = command.command_type(),
        correlation_id = %command.correlation_id(),
        "handling command"
    );
}

fn require_text(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_duration(field: &str, value_ms: i64) -> Result<i64, DomainError> {
    if value_ms <= 0 || value_ms > MAX_PHASE_TIME_MS {
        return Err(DomainError::BadRequest(format!(
            "{field} must be between 1 and {MAX_PHASE_TIME_MS}, got {value_ms}"
        )));
    }
    Ok(value_ms)
}

fn ensure_active(story: &Story) -> Result<(), DomainError> {
    if story.is_active {
        Ok(())
    } else {
        Err(DomainError::InvalidPhase(format!(
            "story {} is not active",
            story.id
        )))
    }
}

fn require_phase(story: &Story, expected: Phase) -> Result<(), DomainError> {
    ensure_active(story)?;
    if story.current_phase != expected {
        return Err(DomainError::InvalidPhase(format!(
            "story {} is in the {} phase, expected {}",
            story.id, story.current_phase, expected
        )));
    }
    Ok(())
}

impl Orchestrator {
    /// Creates an orchestrator with its own timer registry and lock table.
    #[must_use]
    pub fn new(
        store: Arc<dyn StoryStore>,
        clock: Arc<dyn Clock>,
        rng: Arc<Mutex<dyn DeterministicRng>>,
        config: ProgressionConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            store,
            clock,
            rng,
            timers: TimerRegistry::new(config.timer_shards),
            locks: StoryLocks::new(config.lock_shards),
            config,
            this: this.clone(),
        })
    }

    /// The timer registry owned by this orchestrator.
    #[must_use]
    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &dyn StoryStore {
        self.store.as_ref()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    async fn require_story(&self, story_id: Uuid) -> Result<Story, DomainError> {
        self.store
            .load_story(story_id)
            .await?
            .ok_or_else(|| DomainError::story_not_found(story_id))
    }

    async fn require_proposal(&self, proposal_id: Uuid) -> Result<ChapterProposal, DomainError> {
        self.store
            .load_proposal(proposal_id)
            .await?
            .ok_or_else(|| DomainError::proposal_not_found(proposal_id))
    }

    async fn require_admin(&self, story_id: Uuid, user_id: Uuid) -> Result<(), DomainError> {
        match self.store.find_collaborator(story_id, user_id).await? {
            Some(collaborator) if collaborator.role == CollaboratorRole::Admin => Ok(()),
            _ => Err(DomainError::Forbidden(format!(
                "user {user_id} is not an admin of story {story_id}"
            ))),
        }
    }

    /// Creates a story in the PROPOSAL phase with chapter #1 and the author
    /// as its admin.
    ///
    /// # Errors
    ///
    /// `BadRequest` for empty text or out-of-range durations; store errors
    /// are passed through.
    pub async fn create_story(&self, command: &CreateStory) -> Result<Story, DomainError> {
        log_command(command);
        require_text("title", &command.title)?;
        require_text("initial chapter title", &command.initial_chapter_title)?;
        require_text("initial chapter content", &command.initial_chapter_content)?;
        let proposal_time_ms = require_duration(
            "proposal_time_ms",
            command
                .proposal_time_ms
                .unwrap_or(self.config.default_proposal_time_ms),
        )?;
        let voting_time_ms = require_duration(
            "voting_time_ms",
            command
                .voting_time_ms
                .unwrap_or(self.config.default_voting_time_ms),
        )?;

        let now = self.clock.now();
        let story = Story {
            id: Uuid::new_v4(),
            title: command.title.clone(),
            current_phase: Phase::Proposal,
            proposal_time_ms,
            voting_time_ms,
            proposal_deadline: None,
            voting_deadline: None,
            is_active: true,
            version: 0,
            created_at: now,
        };
        let chapter = Chapter {
            id: Uuid::new_v4(),
            story_id: story.id,
            author_id: command.author_id,
            title: command.initial_chapter_title.clone(),
            content: command.initial_chapter_content.clone(),
            position: 1,
            is_last_chapter: true,
            created_at: now,
        };
        let owner = Collaborator {
            story_id: story.id,
            user_id: command.author_id,
            role: CollaboratorRole::Admin,
        };

        self.store.create_story(&story, &chapter, &owner).await?;
        info!(story_id = %story.id, author_id = %command.author_id, "story created");
        Ok(story)
    }

    /// Adds a proposal to the story's open round. The second open proposal
    /// sets the proposal deadline and arms its timer.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown story, `InvalidPhase` outside PROPOSAL,
    /// `BadRequest` if the parent is not a chapter of the story or the text is
    /// empty, `Conflict` if the parent is no longer the last chapter.
    pub async fn submit_proposal(
        &self,
        command: &SubmitProposal,
    ) -> Result<ChapterProposal, DomainError> {
        log_command(command);
        let _guard = self.locks.acquire(command.story_id).await;

        let story = self.require_story(command.story_id).await?;
        require_phase(&story, Phase::Proposal)?;
        require_text("title", &command.title)?;
        require_text("content", &command.content)?;

        let parent = self
            .store
            .load_chapter(command.parent_chapter_id)
            .await?
            .filter(|chapter| chapter.story_id == story.id)
            .ok_or_else(|| {
                DomainError::BadRequest(format!(
                    "chapter {} is not part of story {}",
                    command.parent_chapter_id, story.id
                ))
            })?;
        if !parent.is_last_chapter {
            return Err(DomainError::Conflict(format!(
                "chapter {} is no longer the last chapter of story {}",
                parent.id, story.id
            )));
        }

        let now = self.clock.now();
        let proposal = ChapterProposal {
            id: Uuid::new_v4(),
            story_id: story.id,
            parent_chapter_id: parent.id,
            author_id: command.author_id,
            title: command.title.clone(),
            content: command.content.clone(),
            vote_count: 0,
            created_at: now,
        };

        let open_count = self.store.list_proposals(story.id).await?.len() + 1;
        let decision = phase::on_proposal_submitted(open_count);
        let mut changes = vec![StoreChange::InsertProposal(proposal.clone())];
        if decision.should_arm_proposal_timer {
            changes.push(StoreChange::UpdateStory(phase::open_proposal_window(
                &story, now,
            )?));
        }

        self.store
            .apply_changes(story.id, story.version, &changes)
            .await?;

        if decision.should_arm_proposal_timer {
            self.arm_timer(
                story.id,
                TimerKind::Proposal,
                phase::to_delay(story.proposal_duration()),
            );
        }
        info!(
            story_id = %story.id,
            proposal_id = %proposal.id,
            open_count,
            "proposal submitted"
        );
        Ok(proposal)
    }

    /// Rewrites a proposal's title and/or content.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown proposal, `InvalidPhase` outside PROPOSAL,
    /// `Forbidden` for anyone but the author, `BadRequest` for empty text.
    pub async fn edit_proposal(
        &self,
        command: &EditProposal,
    ) -> Result<ChapterProposal, DomainError> {
        log_command(command);
        let located = self.require_proposal(command.proposal_id).await?;
        let _guard = self.locks.acquire(located.story_id).await;

        let proposal = self.require_proposal(command.proposal_id).await?;
        let story = self.require_story(proposal.story_id).await?;
        require_phase(&story, Phase::Proposal)?;
        if proposal.author_id != command.author_id {
            return Err(DomainError::Forbidden(format!(
                "user {} is not the author of proposal {}",
                command.author_id, proposal.id
            )));
        }

        let title = command.title.clone().unwrap_or_else(|| proposal.title.clone());
        let content = command
            .content
            .clone()
            .unwrap_or_else(|| proposal.content.clone());
        require_text("title", &title)?;
        require_text("content", &content)?;

        self.store
            .apply_changes(
                story.id,
                story.version,
                &[StoreChange::UpdateProposal {
                    proposal_id: proposal.id,
                    title: title.clone(),
                    content: content.clone(),
                }],
            )
            .await?;

        info!(story_id = %story.id, proposal_id = %proposal.id, "proposal edited");
        Ok(ChapterProposal {
            title,
            content,
            ..proposal
        })
    }

    /// Removes a proposal. If fewer than two remain, the proposal deadline is
    /// cleared and its timer cancelled.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown proposal, `InvalidPhase` outside PROPOSAL,
    /// `Forbidden` for anyone but the author.
    pub async fn withdraw_proposal(&self, command: &WithdrawProposal) -> Result<(), DomainError> {
        log_command(command);
        let located = self.require_proposal(command.proposal_id).await?;
        let _guard = self.locks.acquire(located.story_id).await;

        let proposal = self.require_proposal(command.proposal_id).await?;
        let story = self.require_story(proposal.story_id).await?;
        require_phase(&story, Phase::Proposal)?;
        if proposal.author_id != command.author_id {
            return Err(DomainError::Forbidden(format!(
                "user {} is not the author of proposal {}",
                command.author_id, proposal.id
            )));
        }

        let remaining = self
            .store
            .list_proposals(story.id)
            .await?
            .len()
            .saturating_sub(1);
        let closes_window = remaining < PROPOSALS_TO_ARM && story.proposal_deadline.is_some();

        let mut changes = vec![StoreChange::DeleteProposal(proposal.id)];
        if closes_window {
            changes.push(StoreChange::UpdateStory(phase::close_proposal_window(&story)));
        }
        self.store
            .apply_changes(story.id, story.version, &changes)
            .await?;

        if closes_window {
            self.timers.cancel_proposal(story.id);
        }
        info!(
            story_id = %story.id,
            proposal_id = %proposal.id,
            remaining,
            "proposal withdrawn"
        );
        Ok(())
    }

    /// Records a vote and increments the proposal's tally.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown proposal (including one whose round already
    /// closed), `InvalidPhase` outside VOTING, `Conflict` for a repeat vote.
    pub async fn cast_vote(&self, command: &CastVote) -> Result<Vote, DomainError> {
        log_command(command);
        let located = self.require_proposal(command.proposal_id).await?;
        let _guard = self.locks.acquire(located.story_id).await;

        let proposal = self.require_proposal(command.proposal_id).await?;
        let story = self.require_story(proposal.story_id).await?;
        require_phase(&story, Phase::Voting)?;
        if self
            .store
            .find_vote(proposal.id, command.user_id)
            .await?
            .is_some()
        {
            return Err(DomainError::Conflict(format!(
                "user {} already voted for proposal {}",
                command.user_id, proposal.id
            )));
        }

        let vote = Vote {
            id: Uuid::new_v4(),
            chapter_proposal_id: proposal.id,
            author_id: command.user_id,
            created_at: self.clock.now(),
        };
        self.store
            .apply_changes(
                story.id,
                story.version,
                &[
                    StoreChange::InsertVote(vote.clone()),
                    StoreChange::AdjustVoteCount {
                        proposal_id: proposal.id,
                        delta: 1,
                    },
                ],
            )
            .await?;

        info!(story_id = %story.id, proposal_id = %proposal.id, user_id = %command.user_id, "vote cast");
        Ok(vote)
    }

    /// Deletes a vote and decrements the proposal's tally.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown proposal, `InvalidPhase` outside VOTING,
    /// `BadRequest` if the user has no vote on the proposal.
    pub async fn retract_vote(&self, command: &RetractVote) -> Result<(), DomainError> {
        log_command(command);
        let located = self.require_proposal(command.proposal_id).await?;
        let _guard = self.locks.acquire(located.story_id).await;

        let proposal = self.require_proposal(command.proposal_id).await?;
        let story = self.require_story(proposal.story_id).await?;
        require_phase(&story, Phase::Voting)?;
        let vote = self
            .store
            .find_vote(proposal.id, command.user_id)
            .await?
            .ok_or_else(|| {
                DomainError::BadRequest(format!(
                    "user {} has not voted for proposal {}",
                    command.user_id, proposal.id
                ))
            })?;

        self.store
            .apply_changes(
                story.id,
                story.version,
                &[
                    StoreChange::DeleteVote(vote.id),
                    StoreChange::AdjustVoteCount {
                        proposal_id: proposal.id,
                        delta: -1,
                    },
                ],
            )
            .await?;

        info!(story_id = %story.id, proposal_id = %proposal.id, user_id = %command.user_id, "vote retracted");
        Ok(())
    }

    /// Closes the round early with the given proposal as winner.
    ///
    /// Accepted in either phase. The story's timers are cancelled after the
    /// resolution commits and before the story lock is released; a timer
    /// that already woke up finds the round closed and does nothing.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown proposal, `Forbidden` unless the caller is a
    /// story admin, `InvalidPhase` for an inactive story.
    pub async fn admin_select_winner(&self, command: &SelectWinner) -> Result<Chapter, DomainError> {
        log_command(command);
        let located = self.require_proposal(command.proposal_id).await?;
        let _guard = self.locks.acquire(located.story_id).await;

        let proposal = self.require_proposal(command.proposal_id).await?;
        let story = self.require_story(proposal.story_id).await?;
        self.require_admin(story.id, command.caller_id).await?;
        ensure_active(&story)?;

        let resolution = self.close_round(&story, Some(&proposal)).await?;
        let chapter = resolution.new_chapter.ok_or_else(|| {
            DomainError::Infrastructure("winner selection produced no chapter".to_owned())
        })?;
        info!(
            story_id = %story.id,
            proposal_id = %proposal.id,
            chapter_id = %chapter.id,
            caller_id = %command.caller_id,
            "winner selected by admin"
        );
        Ok(chapter)
    }

    /// Changes phase lengths. A running deadline of the matching phase is
    /// recomputed from the time already elapsed, floored at the configured
    /// minimum, and its timer re-armed.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown story, `Forbidden` unless the caller is a
    /// story admin, `InvalidPhase` for an inactive story, `BadRequest` for
    /// missing or out-of-range durations.
    pub async fn change_phase_durations(
        &self,
        command: &ChangePhaseDurations,
    ) -> Result<Story, DomainError> {
        log_command(command);
        if command.proposal_time_ms.is_none() && command.voting_time_ms.is_none() {
            return Err(DomainError::BadRequest(
                "no phase duration given".to_owned(),
            ));
        }
        let _guard = self.locks.acquire(command.story_id).await;

        let story = self.require_story(command.story_id).await?;
        self.require_admin(story.id, command.caller_id).await?;
        ensure_active(&story)?;

        let now = self.clock.now();
        let floor = TimeDelta::from_std(self.config.min_remaining).unwrap_or(TimeDelta::seconds(1));
        let mut updated = story.clone();
        let mut rearm: Option<(TimerKind, TimeDelta)> = None;

        if let Some(ms) = command.proposal_time_ms {
            updated.proposal_time_ms = require_duration("proposal_time_ms", ms)?;
            if let (Phase::Proposal, Some(deadline)) =
                (story.current_phase, story.proposal_deadline)
            {
                let new_deadline = phase::recompute_deadline(
                    deadline,
                    story.proposal_duration(),
                    updated.proposal_duration(),
                    now,
                    floor,
                )?;
                updated.proposal_deadline = Some(new_deadline);
                rearm = Some((TimerKind::Proposal, new_deadline - now));
            }
        }
        if let Some(ms) = command.voting_time_ms {
            updated.voting_time_ms = require_duration("voting_time_ms", ms)?;
            if let (Phase::Voting, Some(deadline)) = (story.current_phase, story.voting_deadline) {
                let new_deadline = phase::recompute_deadline(
                    deadline,
                    story.voting_duration(),
                    updated.voting_duration(),
                    now,
                    floor,
                )?;
                updated.voting_deadline = Some(new_deadline);
                rearm = Some((TimerKind::Voting, new_deadline - now));
            }
        }

        self.store
            .apply_changes(
                story.id,
                story.version,
                &[StoreChange::UpdateStory(updated.clone())],
            )
            .await?;

        if let Some((kind, remaining)) = rearm {
            self.arm_timer(story.id, kind, phase::to_delay(remaining));
        }
        info!(
            story_id = %story.id,
            proposal_time_ms = updated.proposal_time_ms,
            voting_time_ms = updated.voting_time_ms,
            "phase durations changed"
        );
        updated.version = story.version + 1;
        Ok(updated)
    }

    /// Ends the proposal phase of a story whose proposal deadline passed and
    /// arms the voting timer.
    ///
    /// # Errors
    ///
    /// Store errors, or `Infrastructure` if the stored voting duration puts
    /// the deadline out of range; the story is left untouched in both cases.
    pub async fn on_proposal_deadline(&self, story_id: Uuid) -> Result<DeadlineOutcome, DomainError> {
        let _guard = self.locks.acquire(story_id).await;

        let Some(story) = self.store.load_story(story_id).await? else {
            self.timers.cancel_all(story_id);
            return Ok(DeadlineOutcome::Stale);
        };
        let deadline = match (story.current_phase, story.proposal_deadline) {
            (Phase::Proposal, Some(deadline)) => deadline,
            _ => {
                debug!(%story_id, "proposal deadline no longer pending");
                return Ok(DeadlineOutcome::Stale);
            }
        };

        let now = self.clock.now();
        if let Some(remaining) = phase::remaining_until(deadline, now) {
            self.arm_timer(story_id, TimerKind::Proposal, phase::to_delay(remaining));
            return Ok(DeadlineOutcome::Rearmed);
        }

        let voting = phase::resolve_proposal_phase(&story, now)?;
        self.store
            .apply_changes(
                story.id,
                story.version,
                &[StoreChange::UpdateStory(voting.clone())],
            )
            .await?;

        self.timers.cancel_proposal(story.id);
        self.arm_timer(
            story.id,
            TimerKind::Voting,
            phase::to_delay(story.voting_duration()),
        );
        info!(
            %story_id,
            voting_deadline = ?voting.voting_deadline,
            "proposal phase ended, voting opened"
        );
        Ok(DeadlineOutcome::Resolved)
    }

    /// Ends the voting phase of a story whose voting deadline passed: picks
    /// the winner, appends it as a chapter and resets the round.
    ///
    /// # Errors
    ///
    /// Store errors; the story is left untouched in that case.
    pub async fn on_voting_deadline(&self, story_id: Uuid) -> Result<DeadlineOutcome, DomainError> {
        let _guard = self.locks.acquire(story_id).await;

        let Some(story) = self.store.load_story(story_id).await? else {
            self.timers.cancel_all(story_id);
            return Ok(DeadlineOutcome::Stale);
        };
        let deadline = match (story.current_phase, story.voting_deadline) {
            (Phase::Voting, Some(deadline)) => deadline,
            _ => {
                debug!(%story_id, "voting deadline no longer pending");
                return Ok(DeadlineOutcome::Stale);
            }
        };

        let now = self.clock.now();
        if let Some(remaining) = phase::remaining_until(deadline, now) {
            self.arm_timer(story_id, TimerKind::Voting, phase::to_delay(remaining));
            return Ok(DeadlineOutcome::Rearmed);
        }

        let proposals = self.store.list_proposals(story.id).await?;
        let winner = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            phase::select_winner(&proposals, &mut *rng).cloned()
        };

        let resolution = self.close_round(&story, winner.as_ref()).await?;
        match (&winner, &resolution.new_chapter) {
            (Some(winner), Some(chapter)) => info!(
                %story_id,
                proposal_id = %winner.id,
                chapter_id = %chapter.id,
                vote_count = winner.vote_count,
                "voting phase ended, winner appended"
            ),
            _ => info!(%story_id, "voting phase ended without proposals"),
        }
        Ok(DeadlineOutcome::Resolved)
    }

    /// Commits the end of a round and drops the story's timers.
    async fn close_round(
        &self,
        story: &Story,
        winner: Option<&ChapterProposal>,
    ) -> Result<RoundResolution, DomainError> {
        let now = self.clock.now();
        let last_chapter = self.store.last_chapter(story.id).await?;
        let winner_is_collaborator = match winner {
            Some(winner) => self
                .store
                .find_collaborator(story.id, winner.author_id)
                .await?
                .is_some(),
            None => false,
        };

        let resolution = phase::resolve_voting_phase(
            story,
            last_chapter.as_ref(),
            winner,
            winner_is_collaborator,
            Uuid::new_v4(),
            now,
        );
        self.store
            .apply_changes(story.id, story.version, &resolution.changes())
            .await?;

        self.timers.cancel_all(story.id);
        Ok(resolution)
    }

    /// Arms a phase timer whose expiry re-enters this orchestrator.
    pub(crate) fn arm_timer(&self, story_id: Uuid, kind: TimerKind, delay: Duration) {
        let engine = self.this.clone();
        let on_fire: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
            if let Some(engine) = engine.upgrade() {
                engine.handle_timer_fired(story_id, kind).await;
            }
        });
        self.timers.arm(story_id, kind, delay, on_fire);
    }

    /// Timer entry point. There is no caller to report to, so failures are
    /// logged; the deadline stays in the store and the round is retried on
    /// the next rehydration.
    async fn handle_timer_fired(&self, story_id: Uuid, kind: TimerKind) {
        let result = match kind {
            TimerKind::Proposal => self.on_proposal_deadline(story_id).await,
            TimerKind::Voting => self.on_voting_deadline(story_id).await,
        };
        match result {
            Ok(outcome) => debug!(%story_id, %kind, ?outcome, "deadline handled"),
            Err(err) => error!(
                %story_id,
                %kind,
                error = %err,
                "deadline resolution failed; stored deadline kept for rehydration"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use storyloom_test_support::{FailingStoryStore, FixedClock, MockRng};

    fn engine_with(store: Arc<dyn StoryStore>) -> Arc<Orchestrator> {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ));
        let rng: Arc<Mutex<dyn DeterministicRng>> = Arc::new(Mutex::new(MockRng));
        Orchestrator::new(store, clock, rng, ProgressionConfig::default())
    }

    #[tokio::test]
    async fn test_create_story_rejects_empty_title() {
        let engine = engine_with(Arc::new(FailingStoryStore));

        let result = engine
            .create_story(&CreateStory {
                correlation_id: Uuid::new_v4(),
                author_id: Uuid::new_v4(),
                title: "   ".to_owned(),
                proposal_time_ms: None,
                voting_time_ms: None,
                initial_chapter_title: "One".to_owned(),
                initial_chapter_content: "Once upon a time".to_owned(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_create_story_rejects_non_positive_duration() {
        let engine = engine_with(Arc::new(FailingStoryStore));

        let result = engine
            .create_story(&CreateStory {
                correlation_id: Uuid::new_v4(),
                author_id: Uuid::new_v4(),
                title: "Tide".to_owned(),
                proposal_time_ms: Some(0),
                voting_time_ms: None,
                initial_chapter_title: "One".to_owned(),
                initial_chapter_content: "Once upon a time".to_owned(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_infrastructure_error() {
        let engine = engine_with(Arc::new(FailingStoryStore));

        let result = engine
            .submit_proposal(&SubmitProposal {
                correlation_id: Uuid::new_v4(),
                story_id: Uuid::new_v4(),
                parent_chapter_id: Uuid::new_v4(),
                author_id: Uuid::new_v4(),
                title: "T".to_owned(),
                content: "C".to_owned(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
        assert_eq!(engine.timers().armed_count(), 0);
    }

    #[tokio::test]
    async fn test_change_durations_requires_a_value() {
        let engine = engine_with(Arc::new(FailingStoryStore));

        let result = engine
            .change_phase_durations(&ChangePhaseDurations {
                correlation_id: Uuid::new_v4(),
                story_id: Uuid::new_v4(),
                caller_id: Uuid::new_v4(),
                proposal_time_ms: None,
                voting_time_ms: None,
            })
            .await;

        assert!(matches!(result, Err(DomainError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_deadline_for_unknown_story_is_stale_when_store_is_empty() {
        let engine = engine_with(Arc::new(storyloom_test_support::InMemoryStoryStore::new()));

        let proposal = engine.on_proposal_deadline(Uuid::new_v4()).await.unwrap();
        let voting = engine.on_voting_deadline(Uuid::new_v4()).await.unwrap();

        assert_eq!(proposal, DeadlineOutcome::Stale);
        assert_eq!(voting, DeadlineOutcome::Stale);
    }
}
