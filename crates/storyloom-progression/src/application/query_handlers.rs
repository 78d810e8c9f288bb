//! Query handlers for story progression.
//!
//! Read-only views over the store. None of these take a story lock; a view
//! may be one commit behind a concurrent command.

use chrono::{DateTime, Utc};
use serde::Serialize;
use storyloom_core::error::DomainError;
use storyloom_core::model::{Chapter, ChapterProposal, Collaborator, Phase, Story, Vote};
use storyloom_core::store::StoryStore;
use uuid::Uuid;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: usize = 100;

/// Read-only view of a story.
#[derive(Debug, Serialize)]
pub struct StoryView {
    /// The story identifier.
    pub story_id: Uuid,
    /// Display title.
    pub title: String,
    /// Phase of the current round.
    pub current_phase: Phase,
    /// Proposal phase length in milliseconds.
    pub proposal_time_ms: i64,
    /// Voting phase length in milliseconds.
    pub voting_time_ms: i64,
    /// When the proposal phase ends, if armed.
    pub proposal_deadline: Option<DateTime<Utc>>,
    /// When the voting phase ends, if armed.
    pub voting_deadline: Option<DateTime<Utc>>,
    /// Whether the story still progresses.
    pub is_active: bool,
    /// Number of chapters written so far.
    pub chapter_count: usize,
    /// Number of proposals in the open round.
    pub open_proposals: usize,
    /// Current version.
    pub version: i64,
}

impl StoryView {
    fn new(story: Story, chapter_count: usize, open_proposals: usize) -> Self {
        Self {
            story_id: story.id,
            title: story.title,
            current_phase: story.current_phase,
            proposal_time_ms: story.proposal_time_ms,
            voting_time_ms: story.voting_time_ms,
            proposal_deadline: story.proposal_deadline,
            voting_deadline: story.voting_deadline,
            is_active: story.is_active,
            chapter_count,
            open_proposals,
            version: story.version,
        }
    }
}

/// A proposal together with the votes cast for it.
#[derive(Debug, Serialize)]
pub struct ProposalView {
    /// The proposal itself.
    #[serde(flatten)]
    pub proposal: ChapterProposal,
    /// Votes cast for the proposal.
    pub votes: Vec<Vote>,
}

/// One page of the open round's proposals.
#[derive(Debug, Serialize)]
pub struct ProposalPage {
    /// The proposals on this page.
    pub items: Vec<ChapterProposal>,
    /// 1-based page number.
    pub page: usize,
    /// Requested page size.
    pub page_size: usize,
    /// Proposals in the round.
    pub total: usize,
    /// Number of pages; at least 1.
    pub total_pages: usize,
}

async fn require_story(story_id: Uuid, store: &dyn StoryStore) -> Result<Story, DomainError> {
    store
        .load_story(story_id)
        .await?
        .ok_or_else(|| DomainError::story_not_found(story_id))
}

/// Retrieves a story with its chapter and round counts.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the story does not exist.
pub async fn get_story_by_id(
    story_id: Uuid,
    store: &dyn StoryStore,
) -> Result<StoryView, DomainError> {
    let story = require_story(story_id, store).await?;
    let chapter_count = store.list_chapters(story_id).await?.len();
    let open_proposals = store.list_proposals(story_id).await?.len();
    Ok(StoryView::new(story, chapter_count, open_proposals))
}

/// Lists a story's chapters by position.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the story does not exist.
pub async fn list_chapters(
    story_id: Uuid,
    store: &dyn StoryStore,
) -> Result<Vec<Chapter>, DomainError> {
    require_story(story_id, store).await?;
    store.list_chapters(story_id).await
}

/// Lists a story's collaborators.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the story does not exist.
pub async fn list_collaborators(
    story_id: Uuid,
    store: &dyn StoryStore,
) -> Result<Vec<Collaborator>, DomainError> {
    require_story(story_id, store).await?;
    store.list_collaborators(story_id).await
}

/// Retrieves a proposal with its votes.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the proposal does not exist, which
/// includes proposals of a round that already closed.
pub async fn get_proposal_by_id(
    proposal_id: Uuid,
    store: &dyn StoryStore,
) -> Result<ProposalView, DomainError> {
    let proposal = store
        .load_proposal(proposal_id)
        .await?
        .ok_or_else(|| DomainError::proposal_not_found(proposal_id))?;
    let votes = store.list_votes(proposal_id).await?;
    Ok(ProposalView { proposal, votes })
}

/// Lists one page of the open round's proposals, oldest first.
///
/// # Errors
///
/// Returns `DomainError::BadRequest` if `page` is 0 or `page_size` is outside
/// `1..=100`, and `DomainError::NotFound` if the story does not exist.
pub async fn list_proposals_paginated(
    story_id: Uuid,
    page: usize,
    page_size: usize,
    store: &dyn StoryStore,
) -> Result<ProposalPage, DomainError> {
    if page == 0 {
        return Err(DomainError::BadRequest("page must be at least 1".to_owned()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(DomainError::BadRequest(format!(
            "page size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
        )));
    }
    require_story(story_id, store).await?;

    let proposals = store.list_proposals(story_id).await?;
    let total = proposals.len();
    let items = proposals
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();
    Ok(ProposalPage {
        items,
        page,
        page_size,
        total,
        total_pages: total.div_ceil(page_size).max(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use storyloom_test_support::{FailingStoryStore, InMemoryStoryStore};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn seeded_store(proposal_count: u128) -> (InMemoryStoryStore, Uuid) {
        let store = InMemoryStoryStore::new();
        let story_id = Uuid::from_u128(1);
        store.insert_story(Story {
            id: story_id,
            title: "Harbour Lights".to_owned(),
            current_phase: Phase::Proposal,
            proposal_time_ms: 60_000,
            voting_time_ms: 60_000,
            proposal_deadline: None,
            voting_deadline: None,
            is_active: true,
            version: 0,
            created_at: fixed_now(),
        });
        store.insert_chapter(Chapter {
            id: Uuid::from_u128(2),
            story_id,
            author_id: Uuid::from_u128(3),
            title: "Arrival".to_owned(),
            content: "The ferry docked at dawn.".to_owned(),
            position: 1,
            is_last_chapter: true,
            created_at: fixed_now(),
        });
        for n in 0..proposal_count {
            store.insert_proposal(ChapterProposal {
                id: Uuid::from_u128(100 + n),
                story_id,
                parent_chapter_id: Uuid::from_u128(2),
                author_id: Uuid::from_u128(200 + n),
                title: format!("Option {n}"),
                content: format!("Continuation {n}"),
                vote_count: 0,
                created_at: fixed_now() + TimeDelta::seconds(i64::try_from(n).unwrap()),
            });
        }
        (store, story_id)
    }

    #[tokio::test]
    async fn test_get_story_by_id_returns_view_with_counts() {
        // Arrange
        let (store, story_id) = seeded_store(3);

        // Act
        let view = get_story_by_id(story_id, &store).await.unwrap();

        // Assert
        assert_eq!(view.story_id, story_id);
        assert_eq!(view.title, "Harbour Lights");
        assert_eq!(view.current_phase, Phase::Proposal);
        assert_eq!(view.chapter_count, 1);
        assert_eq!(view.open_proposals, 3);
    }

    #[tokio::test]
    async fn test_get_story_by_id_returns_not_found_for_unknown_story() {
        let store = InMemoryStoryStore::new();
        let story_id = Uuid::new_v4();

        let result = get_story_by_id(story_id, &store).await;

        match result.unwrap_err() {
            DomainError::NotFound { entity, id } => {
                assert_eq!(entity, "story");
                assert_eq!(id, story_id);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_proposals_paginated_returns_requested_slice() {
        // Arrange
        let (store, story_id) = seeded_store(5);

        // Act
        let page = list_proposals_paginated(story_id, 2, 2, &store).await.unwrap();

        // Assert
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        let ids: Vec<Uuid> = page.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(102), Uuid::from_u128(103)]);
    }

    #[tokio::test]
    async fn test_list_proposals_paginated_of_empty_round_has_one_page() {
        let (store, story_id) = seeded_store(0);

        let page = list_proposals_paginated(story_id, 1, 10, &store).await.unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn test_list_proposals_paginated_rejects_bad_paging() {
        let (store, story_id) = seeded_store(1);

        let zero_page = list_proposals_paginated(story_id, 0, 10, &store).await;
        let huge_page = list_proposals_paginated(story_id, 1, 101, &store).await;
        let empty_page = list_proposals_paginated(story_id, 1, 0, &store).await;

        assert!(matches!(zero_page, Err(DomainError::BadRequest(_))));
        assert!(matches!(huge_page, Err(DomainError::BadRequest(_))));
        assert!(matches!(empty_page, Err(DomainError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_get_proposal_by_id_includes_votes() {
        // Arrange
        let (store, _) = seeded_store(1);
        let proposal_id = Uuid::from_u128(100);
        store.insert_vote(Vote {
            id: Uuid::new_v4(),
            chapter_proposal_id: proposal_id,
            author_id: Uuid::new_v4(),
            created_at: fixed_now(),
        });

        // Act
        let view = get_proposal_by_id(proposal_id, &store).await.unwrap();

        // Assert
        assert_eq!(view.proposal.id, proposal_id);
        assert_eq!(view.votes.len(), 1);
    }

    #[tokio::test]
    async fn test_queries_propagate_store_failures() {
        let result = list_chapters(Uuid::new_v4(), &FailingStoryStore).await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }
}
