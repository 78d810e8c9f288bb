//! Persistence contract consumed by the progression engine.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainError;
use crate::model::{Chapter, ChapterProposal, Collaborator, Story, Vote};

/// One mutation inside an atomic change batch for a single story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// Overwrite the story's phase, durations, deadlines and active flag.
    UpdateStory(Story),
    /// Append a chapter.
    InsertChapter(Chapter),
    /// Clear `is_last_chapter` on a chapter.
    DemoteChapter(Uuid),
    /// Add a proposal to the open round.
    InsertProposal(ChapterProposal),
    /// Replace a proposal's text.
    UpdateProposal {
        /// The proposal to edit.
        proposal_id: Uuid,
        /// New title.
        title: String,
        /// New content.
        content: String,
    },
    /// Remove a proposal together with its votes.
    DeleteProposal(Uuid),
    /// Record a vote.
    InsertVote(Vote),
    /// Remove a vote.
    DeleteVote(Uuid),
    /// Atomically add `delta` to a proposal's `vote_count`.
    AdjustVoteCount {
        /// The proposal whose tally changes.
        proposal_id: Uuid,
        /// Signed change.
        delta: i32,
    },
    /// Grant a role on the story unless the user is already a collaborator.
    AddCollaborator(Collaborator),
    /// Delete every proposal and vote of the story's round.
    ClearRound,
}

/// Durable store for stories and their rounds.
///
/// The store is the source of truth. `apply_changes` is the only way the
/// engine mutates an existing story and must be all-or-nothing.
#[async_trait]
pub trait StoryStore: Send + Sync {
    /// Persist a new story with its first chapter and owner.
    async fn create_story(
        &self,
        story: &Story,
        initial_chapter: &Chapter,
        owner: &Collaborator,
    ) -> Result<(), DomainError>;

    /// Load a story by id.
    async fn load_story(&self, story_id: Uuid) -> Result<Option<Story>, DomainError>;

    /// All stories with a proposal or voting deadline set.
    async fn stories_with_deadlines(&self) -> Result<Vec<Story>, DomainError>;

    /// Load a chapter by id.
    async fn load_chapter(&self, chapter_id: Uuid) -> Result<Option<Chapter>, DomainError>;

    /// The story's chapter flagged `is_last_chapter`.
    async fn last_chapter(&self, story_id: Uuid) -> Result<Option<Chapter>, DomainError>;

    /// All chapters of a story ordered by position.
    async fn list_chapters(&self, story_id: Uuid) -> Result<Vec<Chapter>, DomainError>;

    /// Load a proposal by id.
    async fn load_proposal(&self, proposal_id: Uuid)
    -> Result<Option<ChapterProposal>, DomainError>;

    /// Open proposals of a story, oldest first (ties broken by id).
    async fn list_proposals(&self, story_id: Uuid) -> Result<Vec<ChapterProposal>, DomainError>;

    /// A user's vote on a proposal, if any.
    async fn find_vote(
        &self,
        proposal_id: Uuid,
        author_id: Uuid,
    ) -> Result<Option<Vote>, DomainError>;

    /// All votes on a proposal.
    async fn list_votes(&self, proposal_id: Uuid) -> Result<Vec<Vote>, DomainError>;

    /// A user's collaborator record on a story, if any.
    async fn find_collaborator(
        &self,
        story_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Collaborator>, DomainError>;

    /// All collaborators of a story.
    async fn list_collaborators(&self, story_id: Uuid) -> Result<Vec<Collaborator>, DomainError>;

    /// Apply `changes` atomically with optimistic concurrency on the story
    /// version, bumping it by one on success.
    ///
    /// # Errors
    ///
    /// `NotFound` if the story is missing, `ConcurrencyConflict` if its
    /// version is not `expected_version`, `Infrastructure` on any other
    /// failure. Nothing is written in any error case.
    async fn apply_changes(
        &self,
        story_id: Uuid,
        expected_version: i64,
        changes: &[StoreChange],
    ) -> Result<(), DomainError>;
}
