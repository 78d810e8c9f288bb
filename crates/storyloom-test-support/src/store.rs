//! Test stores — in-memory and failing `StoryStore` implementations.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use storyloom_core::error::DomainError;
use storyloom_core::model::{Chapter, ChapterProposal, Collaborator, Story, Vote};
use storyloom_core::store::{StoreChange, StoryStore};
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
struct Tables {
    stories: HashMap<Uuid, Story>,
    chapters: Vec<Chapter>,
    proposals: Vec<ChapterProposal>,
    votes: Vec<Vote>,
    collaborators: Vec<Collaborator>,
}

impl Tables {
    fn apply(&mut self, story_id: Uuid, change: &StoreChange) -> Result<(), DomainError> {
        match change {
            StoreChange::UpdateStory(story) => {
                let stored = self
                    .stories
                    .get_mut(&story_id)
                    .ok_or_else(|| DomainError::story_not_found(story_id))?;
                let version = stored.version;
                *stored = story.clone();
                stored.version = version;
            }
            StoreChange::InsertChapter(chapter) => {
                if self
                    .chapters
                    .iter()
                    .any(|c| c.story_id == story_id && c.position == chapter.position)
                {
                    return Err(DomainError::Infrastructure(format!(
                        "duplicate chapter position {}",
                        chapter.position
                    )));
                }
                if chapter.is_last_chapter
                    && self
                        .chapters
                        .iter()
                        .any(|c| c.story_id == story_id && c.is_last_chapter)
                {
                    return Err(DomainError::Infrastructure(
                        "story already has a last chapter".to_owned(),
                    ));
                }
                self.chapters.push(chapter.clone());
            }
            StoreChange::DemoteChapter(chapter_id) => {
                let chapter = self
                    .chapters
                    .iter_mut()
                    .find(|c| c.id == *chapter_id)
                    .ok_or_else(|| missing("chapter", *chapter_id))?;
                chapter.is_last_chapter = false;
            }
            StoreChange::InsertProposal(proposal) => self.proposals.push(proposal.clone()),
            StoreChange::UpdateProposal {
                proposal_id,
                title,
                content,
            } => {
                let proposal = self.proposal_mut(*proposal_id)?;
                proposal.title.clone_from(title);
                proposal.content.clone_from(content);
            }
            StoreChange::DeleteProposal(proposal_id) => {
                self.proposal_mut(*proposal_id)?;
                self.proposals.retain(|p| p.id != *proposal_id);
                self.votes.retain(|v| v.chapter_proposal_id != *proposal_id);
            }
            StoreChange::InsertVote(vote) => {
                if self.votes.iter().any(|v| {
                    v.chapter_proposal_id == vote.chapter_proposal_id
                        && v.author_id == vote.author_id
                }) {
                    return Err(DomainError::Conflict(
                        "unique (chapter_proposal_id, author_id) violated".to_owned(),
                    ));
                }
                self.votes.push(vote.clone());
            }
            StoreChange::DeleteVote(vote_id) => {
                if !self.votes.iter().any(|v| v.id == *vote_id) {
                    return Err(missing("vote", *vote_id));
                }
                self.votes.retain(|v| v.id != *vote_id);
            }
            StoreChange::AdjustVoteCount { proposal_id, delta } => {
                self.proposal_mut(*proposal_id)?.vote_count += delta;
            }
            StoreChange::AddCollaborator(collaborator) => {
                if !self
                    .collaborators
                    .iter()
                    .any(|c| c.story_id == story_id && c.user_id == collaborator.user_id)
                {
                    self.collaborators.push(collaborator.clone());
                }
            }
            StoreChange::ClearRound => {
                let round: HashSet<Uuid> = self
                    .proposals
                    .iter()
                    .filter(|p| p.story_id == story_id)
                    .map(|p| p.id)
                    .collect();
                self.votes
                    .retain(|v| !round.contains(&v.chapter_proposal_id));
                self.proposals.retain(|p| p.story_id != story_id);
            }
        }
        Ok(())
    }

    fn proposal_mut(&mut self, proposal_id: Uuid) -> Result<&mut ChapterProposal, DomainError> {
        self.proposals
            .iter_mut()
            .find(|p| p.id == proposal_id)
            .ok_or_else(|| missing("proposal", proposal_id))
    }
}

fn missing(entity: &str, id: Uuid) -> DomainError {
    DomainError::Infrastructure(format!("{entity} {id} vanished during commit"))
}

/// A fully functional in-memory store. Change batches are applied to a copy
/// of the tables and swapped in only if every change succeeds.
///
/// Commit failures can be injected globally or per story to exercise the
/// engine's "store failed, touch no timers" paths. A commit delay keeps the
/// caller inside `apply_changes` for a while, so tests can race other
/// operations against a held story lock.
#[derive(Debug, Default)]
pub struct InMemoryStoryStore {
    tables: Mutex<Tables>,
    fail_all_commits: AtomicBool,
    failing_stories: Mutex<HashSet<Uuid>>,
    commit_delay: Mutex<Duration>,
    commits: AtomicUsize,
}

impl InMemoryStoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds a story record as-is.
    pub fn insert_story(&self, story: Story) {
        self.tables().stories.insert(story.id, story);
    }

    /// Seeds a chapter record as-is.
    pub fn insert_chapter(&self, chapter: Chapter) {
        self.tables().chapters.push(chapter);
    }

    /// Seeds a proposal record as-is.
    pub fn insert_proposal(&self, proposal: ChapterProposal) {
        self.tables().proposals.push(proposal);
    }

    /// Seeds a vote record as-is. The proposal's `vote_count` is not touched.
    pub fn insert_vote(&self, vote: Vote) {
        self.tables().votes.push(vote);
    }

    /// Seeds a collaborator record as-is.
    pub fn insert_collaborator(&self, collaborator: Collaborator) {
        self.tables().collaborators.push(collaborator);
    }

    /// Snapshot of a story.
    #[must_use]
    pub fn story(&self, story_id: Uuid) -> Option<Story> {
        self.tables().stories.get(&story_id).cloned()
    }

    /// Snapshot of a story's chapters ordered by position.
    #[must_use]
    pub fn chapters(&self, story_id: Uuid) -> Vec<Chapter> {
        let mut chapters: Vec<Chapter> = self
            .tables()
            .chapters
            .iter()
            .filter(|c| c.story_id == story_id)
            .cloned()
            .collect();
        chapters.sort_by_key(|c| c.position);
        chapters
    }

    /// Snapshot of a story's open proposals.
    #[must_use]
    pub fn proposals(&self, story_id: Uuid) -> Vec<ChapterProposal> {
        self.tables()
            .proposals
            .iter()
            .filter(|p| p.story_id == story_id)
            .cloned()
            .collect()
    }

    /// Total number of stored votes across all stories.
    #[must_use]
    pub fn vote_total(&self) -> usize {
        self.tables().votes.len()
    }

    /// Snapshot of a story's collaborators.
    #[must_use]
    pub fn collaborators(&self, story_id: Uuid) -> Vec<Collaborator> {
        self.tables()
            .collaborators
            .iter()
            .filter(|c| c.story_id == story_id)
            .cloned()
            .collect()
    }

    /// Makes every subsequent `apply_changes` fail (or succeed again).
    pub fn fail_commits(&self, fail: bool) {
        self.fail_all_commits.store(fail, Ordering::SeqCst);
    }

    /// Makes `apply_changes` fail for one story only.
    pub fn fail_commits_for(&self, story_id: Uuid) {
        self.failing_stories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(story_id);
    }

    /// Makes every subsequent `apply_changes` sleep for `delay` (tokio time)
    /// before committing.
    pub fn delay_commits(&self, delay: Duration) {
        *self
            .commit_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Number of successfully committed change batches.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn commit_should_fail(&self, story_id: Uuid) -> bool {
        self.fail_all_commits.load(Ordering::SeqCst)
            || self
                .failing_stories
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&story_id)
    }
}

#[async_trait]
impl StoryStore for InMemoryStoryStore {
    async fn create_story(
        &self,
        story: &Story,
        initial_chapter: &Chapter,
        owner: &Collaborator,
    ) -> Result<(), DomainError> {
        let mut tables = self.tables();
        if tables.stories.contains_key(&story.id) {
            return Err(DomainError::Conflict(format!(
                "story {} already exists",
                story.id
            )));
        }
        tables.stories.insert(story.id, story.clone());
        tables.chapters.push(initial_chapter.clone());
        tables.collaborators.push(owner.clone());
        Ok(())
    }

    async fn load_story(&self, story_id: Uuid) -> Result<Option<Story>, DomainError> {
        Ok(self.story(story_id))
    }

    async fn stories_with_deadlines(&self) -> Result<Vec<Story>, DomainError> {
        let mut stories: Vec<Story> = self
            .tables()
            .stories
            .values()
            .filter(|s| s.has_pending_deadline())
            .cloned()
            .collect();
        stories.sort_by_key(|s| s.id);
        Ok(stories)
    }

    async fn load_chapter(&self, chapter_id: Uuid) -> Result<Option<Chapter>, DomainError> {
        Ok(self
            .tables()
            .chapters
            .iter()
            .find(|c| c.id == chapter_id)
            .cloned())
    }

    async fn last_chapter(&self, story_id: Uuid) -> Result<Option<Chapter>, DomainError> {
        Ok(self
            .tables()
            .chapters
            .iter()
            .filter(|c| c.story_id == story_id && c.is_last_chapter)
            .max_by_key(|c| c.position)
            .cloned())
    }

    async fn list_chapters(&self, story_id: Uuid) -> Result<Vec<Chapter>, DomainError> {
        Ok(self.chapters(story_id))
    }

    async fn load_proposal(
        &self,
        proposal_id: Uuid,
    ) -> Result<Option<ChapterProposal>, DomainError> {
        Ok(self
            .tables()
            .proposals
            .iter()
            .find(|p| p.id == proposal_id)
            .cloned())
    }

    async fn list_proposals(&self, story_id: Uuid) -> Result<Vec<ChapterProposal>, DomainError> {
        let mut proposals = self.proposals(story_id);
        proposals.sort_by_key(|p| (p.created_at, p.id));
        Ok(proposals)
    }

    async fn find_vote(
        &self,
        proposal_id: Uuid,
        author_id: Uuid,
    ) -> Result<Option<Vote>, DomainError> {
        Ok(self
            .tables()
            .votes
            .iter()
            .find(|v| v.chapter_proposal_id == proposal_id && v.author_id == author_id)
            .cloned())
    }

    async fn list_votes(&self, proposal_id: Uuid) -> Result<Vec<Vote>, DomainError> {
        Ok(self
            .tables()
            .votes
            .iter()
            .filter(|v| v.chapter_proposal_id == proposal_id)
            .cloned()
            .collect())
    }

    async fn find_collaborator(
        &self,
        story_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Collaborator>, DomainError> {
        Ok(self
            .tables()
            .collaborators
            .iter()
            .find(|c| c.story_id == story_id && c.user_id == user_id)
            .cloned())
    }

    async fn list_collaborators(&self, story_id: Uuid) -> Result<Vec<Collaborator>, DomainError> {
        Ok(self.collaborators(story_id))
    }

    async fn apply_changes(
        &self,
        story_id: Uuid,
        expected_version: i64,
        changes: &[StoreChange],
    ) -> Result<(), DomainError> {
        let delay = *self
            .commit_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.commit_should_fail(story_id) {
            return Err(DomainError::Infrastructure("connection refused".into()));
        }

        let mut tables = self.tables();
        let actual = tables
            .stories
            .get(&story_id)
            .map(|s| s.version)
            .ok_or_else(|| DomainError::story_not_found(story_id))?;
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                story_id,
                expected: expected_version,
                actual,
            });
        }

        let mut staged = tables.clone();
        for change in changes {
            staged.apply(story_id, change)?;
        }
        if let Some(story) = staged.stories.get_mut(&story_id) {
            story.version += 1;
        }
        *tables = staged;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A store that always returns an infrastructure error. Useful for testing
/// error-handling paths.
#[derive(Debug)]
pub struct FailingStoryStore;

fn refused<T>() -> Result<T, DomainError> {
    Err(DomainError::Infrastructure("connection refused".into()))
}

#[async_trait]
impl StoryStore for FailingStoryStore {
    async fn create_story(
        &self,
        _story: &Story,
        _initial_chapter: &Chapter,
        _owner: &Collaborator,
    ) -> Result<(), DomainError> {
        refused()
    }

    async fn load_story(&self, _story_id: Uuid) -> Result<Option<Story>, DomainError> {
        refused()
    }

    async fn stories_with_deadlines(&self) -> Result<Vec<Story>, DomainError> {
        refused()
    }

    async fn load_chapter(&self, _chapter_id: Uuid) -> Result<Option<Chapter>, DomainError> {
        refused()
    }

    async fn last_chapter(&self, _story_id: Uuid) -> Result<Option<Chapter>, DomainError> {
        refused()
    }

    async fn list_chapters(&self, _story_id: Uuid) -> Result<Vec<Chapter>, DomainError> {
        refused()
    }

    async fn load_proposal(
        &self,
        _proposal_id: Uuid,
    ) -> Result<Option<ChapterProposal>, DomainError> {
        refused()
    }

    async fn list_proposals(&self, _story_id: Uuid) -> Result<Vec<ChapterProposal>, DomainError> {
        refused()
    }

    async fn find_vote(
        &self,
        _proposal_id: Uuid,
        _author_id: Uuid,
    ) -> Result<Option<Vote>, DomainError> {
        refused()
    }

    async fn list_votes(&self, _proposal_id: Uuid) -> Result<Vec<Vote>, DomainError> {
        refused()
    }

    async fn find_collaborator(
        &self,
        _story_id: Uuid,
        _user_id: Uuid,
    ) -> Result<Option<Collaborator>, DomainError> {
        refused()
    }

    async fn list_collaborators(
        &self,
        _story_id: Uuid,
    ) -> Result<Vec<Collaborator>, DomainError> {
        refused()
    }

    async fn apply_changes(
        &self,
        _story_id: Uuid,
        _expected_version: i64,
        _changes: &[StoreChange],
    ) -> Result<(), DomainError> {
        refused()
    }
}
