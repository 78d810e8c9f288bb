//! Row shapes as they come back from `PostgreSQL`.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use storyloom_core::error::DomainError;
use storyloom_core::model::{Chapter, ChapterProposal, Collaborator, Story, Vote};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub(crate) struct StoryRow {
    id: Uuid,
    title: String,
    current_phase: String,
    proposal_time_ms: i64,
    voting_time_ms: i64,
    proposal_deadline: Option<DateTime<Utc>>,
    voting_deadline: Option<DateTime<Utc>>,
    is_active: bool,
    version: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<StoryRow> for Story {
    type Error = DomainError;

    fn try_from(row: StoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            title: row.title,
            current_phase: row.current_phase.parse()?,
            proposal_time_ms: row.proposal_time_ms,
            voting_time_ms: row.voting_time_ms,
            proposal_deadline: row.proposal_deadline,
            voting_deadline: row.voting_deadline,
            is_active: row.is_active,
            version: row.version,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ChapterRow {
    id: Uuid,
    story_id: Uuid,
    author_id: Uuid,
    title: String,
    content: String,
    position: i32,
    is_last_chapter: bool,
    created_at: DateTime<Utc>,
}

impl From<ChapterRow> for Chapter {
    fn from(row: ChapterRow) -> Self {
        Self {
            id: row.id,
            story_id: row.story_id,
            author_id: row.author_id,
            title: row.title,
            content: row.content,
            position: row.position,
            is_last_chapter: row.is_last_chapter,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ProposalRow {
    id: Uuid,
    story_id: Uuid,
    parent_chapter_id: Uuid,
    author_id: Uuid,
    title: String,
    content: String,
    vote_count: i32,
    created_at: DateTime<Utc>,
}

impl From<ProposalRow> for ChapterProposal {
    fn from(row: ProposalRow) -> Self {
        Self {
            id: row.id,
            story_id: row.story_id,
            parent_chapter_id: row.parent_chapter_id,
            author_id: row.author_id,
            title: row.title,
            content: row.content,
            vote_count: row.vote_count,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct VoteRow {
    id: Uuid,
    chapter_proposal_id: Uuid,
    author_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<VoteRow> for Vote {
    fn from(row: VoteRow) -> Self {
        Self {
            id: row.id,
            chapter_proposal_id: row.chapter_proposal_id,
            author_id: row.author_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct CollaboratorRow {
    story_id: Uuid,
    user_id: Uuid,
    role: String,
}

impl TryFrom<CollaboratorRow> for Collaborator {
    type Error = DomainError;

    fn try_from(row: CollaboratorRow) -> Result<Self, Self::Error> {
        Ok(Self {
            story_id: row.story_id,
            user_id: row.user_id,
            role: row.role.parse()?,
        })
    }
}
