//! Shared helpers for progression engine scenarios.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use storyloom_core::clock::Clock;
use storyloom_core::model::{Chapter, ChapterProposal, Story};
use storyloom_core::rng::{DeterministicRng, SeededRng};
use storyloom_core::store::StoryStore;
use storyloom_progression::application::orchestrator::Orchestrator;
use storyloom_progression::config::ProgressionConfig;
use storyloom_progression::domain::commands::{CastVote, CreateStory, SubmitProposal};
use storyloom_test_support::{InMemoryStoryStore, TokioClock};
use uuid::Uuid;

pub const PROPOSAL_MS: i64 = 60_000;
pub const VOTING_MS: i64 = 30_000;

/// Wall-clock reading at tokio time zero.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// An engine over an in-memory store whose clock follows tokio time.
pub struct Harness {
    pub store: Arc<InMemoryStoryStore>,
    pub engine: Arc<Orchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStoryStore::new()))
    }

    pub fn with_store(store: Arc<InMemoryStoryStore>) -> Self {
        Self::with_clock(store, Arc::new(TokioClock::new(epoch())))
    }

    /// An engine whose wall clock is driven by the test instead of tokio time.
    pub fn with_clock(store: Arc<InMemoryStoryStore>, clock: Arc<dyn Clock>) -> Self {
        let rng: Arc<Mutex<dyn DeterministicRng>> = Arc::new(Mutex::new(SeededRng::new(7)));
        let dyn_store: Arc<dyn StoryStore> = store.clone();
        let engine = Orchestrator::new(dyn_store, clock, rng, ProgressionConfig::default());
        Self { store, engine }
    }

    /// Creates a story and returns it with its opening chapter and admin.
    pub async fn create_story(&self) -> (Story, Chapter, Uuid) {
        let admin_id = Uuid::new_v4();
        let story = self
            .engine
            .create_story(&CreateStory {
                correlation_id: Uuid::new_v4(),
                author_id: admin_id,
                title: "The Lighthouse Keeper".to_owned(),
                proposal_time_ms: Some(PROPOSAL_MS),
                voting_time_ms: Some(VOTING_MS),
                initial_chapter_title: "Landfall".to_owned(),
                initial_chapter_content: "The supply boat was three days late.".to_owned(),
            })
            .await
            .unwrap();
        let chapter = self.store.chapters(story.id).remove(0);
        (story, chapter, admin_id)
    }

    pub async fn submit(&self, story_id: Uuid, parent_chapter_id: Uuid) -> ChapterProposal {
        self.try_submit(story_id, parent_chapter_id, Uuid::new_v4())
            .await
            .unwrap()
    }

    pub async fn try_submit(
        &self,
        story_id: Uuid,
        parent_chapter_id: Uuid,
        author_id: Uuid,
    ) -> Result<ChapterProposal, storyloom_core::error::DomainError> {
        self.engine
            .submit_proposal(&SubmitProposal {
                correlation_id: Uuid::new_v4(),
                story_id,
                parent_chapter_id,
                author_id,
                title: "What the tide brought".to_owned(),
                content: format!("A crate washed ashore, addressed to {author_id}."),
            })
            .await
    }

    pub async fn vote(&self, proposal_id: Uuid) {
        self.engine
            .cast_vote(&CastVote {
                correlation_id: Uuid::new_v4(),
                proposal_id,
                user_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
    }

    pub fn story(&self, story_id: Uuid) -> Story {
        self.store.story(story_id).unwrap()
    }
}

/// Advances paused tokio time, letting due timers run.
pub async fn advance_ms(ms: u64) {
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
}
