//! `PostgreSQL` implementation of the `StoryStore` trait.
//!
//! Every change batch runs in one transaction. The story row is locked with
//! `SELECT ... FOR UPDATE`, its version compared with the caller's
//! expectation, the changes applied in order and the version bumped before
//! commit. Dropping the transaction on any error rolls everything back.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use storyloom_core::error::DomainError;
use storyloom_core::model::{Chapter, ChapterProposal, Collaborator, Story, Vote};
use storyloom_core::store::{StoreChange, StoryStore};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::rows::{ChapterRow, CollaboratorRow, ProposalRow, StoryRow, VoteRow};

const SELECT_STORY: &str = "SELECT id, title, current_phase, proposal_time_ms, voting_time_ms, \
     proposal_deadline, voting_deadline, is_active, version, created_at FROM stories";

const SELECT_CHAPTER: &str = "SELECT id, story_id, author_id, title, content, position, \
     is_last_chapter, created_at FROM chapters";

const SELECT_PROPOSAL: &str = "SELECT id, story_id, parent_chapter_id, author_id, title, content, \
     vote_count, created_at FROM chapter_proposals";

const SELECT_VOTE: &str = "SELECT id, chapter_proposal_id, author_id, created_at FROM votes";

const SELECT_COLLABORATOR: &str = "SELECT story_id, user_id, role FROM story_collaborators";

fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}

/// Unique violations become `Conflict`; everything else is infrastructure.
fn write_error(err: sqlx::Error) -> DomainError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DomainError::Conflict(db.message().to_owned())
        }
        _ => infrastructure(err),
    }
}

fn expect_one_row(affected: u64, entity: &str, id: Uuid) -> Result<(), DomainError> {
    if affected == 1 {
        Ok(())
    } else {
        Err(DomainError::Infrastructure(format!(
            "{entity} {id} vanished during commit"
        )))
    }
}

/// PostgreSQL-backed story store.
#[derive(Debug, Clone)]
pub struct PgStoryStore {
    pool: PgPool,
}

impl PgStoryStore {
    /// Creates a new `PgStoryStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_chapter(
        tx: &mut Transaction<'_, Postgres>,
        chapter: &Chapter,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO chapters \
             (id, story_id, author_id, title, content, position, is_last_chapter, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(chapter.id)
        .bind(chapter.story_id)
        .bind(chapter.author_id)
        .bind(&chapter.title)
        .bind(&chapter.content)
        .bind(chapter.position)
        .bind(chapter.is_last_chapter)
        .bind(chapter.created_at)
        .execute(&mut **tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn insert_collaborator(
        tx: &mut Transaction<'_, Postgres>,
        collaborator: &Collaborator,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO story_collaborators (story_id, user_id, role) VALUES ($1, $2, $3) \
             ON CONFLICT (story_id, user_id) DO NOTHING",
        )
        .bind(collaborator.story_id)
        .bind(collaborator.user_id)
        .bind(collaborator.role.as_str())
        .execute(&mut **tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn apply_change(
        tx: &mut Transaction<'_, Postgres>,
        story_id: Uuid,
        change: &StoreChange,
    ) -> Result<(), DomainError> {
        match change {
            StoreChange::UpdateStory(story) => {
                sqlx::query(
                    "UPDATE stories SET title = $2, current_phase = $3, proposal_time_ms = $4, \
                     voting_time_ms = $5, proposal_deadline = $6, voting_deadline = $7, \
                     is_active = $8 WHERE id = $1",
                )
                .bind(story_id)
                .bind(&story.title)
                .bind(story.current_phase.as_str())
                .bind(story.proposal_time_ms)
                .bind(story.voting_time_ms)
                .bind(story.proposal_deadline)
                .bind(story.voting_deadline)
                .bind(story.is_active)
                .execute(&mut **tx)
                .await
                .map_err(write_error)?;
            }
            StoreChange::InsertChapter(chapter) => Self::insert_chapter(tx, chapter).await?,
            StoreChange::DemoteChapter(chapter_id) => {
                let result = sqlx::query(
                    "UPDATE chapters SET is_last_chapter = FALSE WHERE id = $1 AND story_id = $2",
                )
                .bind(chapter_id)
                .bind(story_id)
                .execute(&mut **tx)
                .await
                .map_err(write_error)?;
                expect_one_row(result.rows_affected(), "chapter", *chapter_id)?;
            }
            StoreChange::InsertProposal(proposal) => {
                sqlx::query(
                    "INSERT INTO chapter_proposals \
                     (id, story_id, parent_chapter_id, author_id, title, content, vote_count, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                )
                .bind(proposal.id)
                .bind(proposal.story_id)
                .bind(proposal.parent_chapter_id)
                .bind(proposal.author_id)
                .bind(&proposal.title)
                .bind(&proposal.content)
                .bind(proposal.vote_count)
                .bind(proposal.created_at)
                .execute(&mut **tx)
                .await
                .map_err(write_error)?;
            }
            StoreChange::UpdateProposal {
                proposal_id,
                title,
                content,
            } => {
                let result = sqlx::query(
                    "UPDATE chapter_proposals SET title = $2, content = $3 WHERE id = $1",
                )
                .bind(proposal_id)
                .bind(title)
                .bind(content)
                .execute(&mut **tx)
                .await
                .map_err(write_error)?;
                expect_one_row(result.rows_affected(), "proposal", *proposal_id)?;
            }
            StoreChange::DeleteProposal(proposal_id) => {
                let result = sqlx::query("DELETE FROM chapter_proposals WHERE id = $1")
                    .bind(proposal_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(write_error)?;
                expect_one_row(result.rows_affected(), "proposal", *proposal_id)?;
            }
            StoreChange::InsertVote(vote) => {
                sqlx::query(
                    "INSERT INTO votes (id, chapter_proposal_id, author_id, created_at) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(vote.id)
                .bind(vote.chapter_proposal_id)
                .bind(vote.author_id)
                .bind(vote.created_at)
                .execute(&mut **tx)
                .await
                .map_err(write_error)?;
            }
            StoreChange::DeleteVote(vote_id) => {
                let result = sqlx::query("DELETE FROM votes WHERE id = $1")
                    .bind(vote_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(write_error)?;
                expect_one_row(result.rows_affected(), "vote", *vote_id)?;
            }
            StoreChange::AdjustVoteCount { proposal_id, delta } => {
                let result = sqlx::query(
                    "UPDATE chapter_proposals SET vote_count = vote_count + $2 WHERE id = $1",
                )
                .bind(proposal_id)
                .bind(delta)
                .execute(&mut **tx)
                .await
                .map_err(write_error)?;
                expect_one_row(result.rows_affected(), "proposal", *proposal_id)?;
            }
            StoreChange::AddCollaborator(collaborator) => {
                Self::insert_collaborator(tx, collaborator).await?;
            }
            StoreChange::ClearRound => {
                // Votes go with their proposals through ON DELETE CASCADE.
                sqlx::query("DELETE FROM chapter_proposals WHERE story_id = $1")
                    .bind(story_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(write_error)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StoryStore for PgStoryStore {
    async fn create_story(
        &self,
        story: &Story,
        initial_chapter: &Chapter,
        owner: &Collaborator,
    ) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;

        sqlx::query(
            "INSERT INTO stories (id, title, current_phase, proposal_time_ms, voting_time_ms, \
             proposal_deadline, voting_deadline, is_active, version, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(story.id)
        .bind(&story.title)
        .bind(story.current_phase.as_str())
        .bind(story.proposal_time_ms)
        .bind(story.voting_time_ms)
        .bind(story.proposal_deadline)
        .bind(story.voting_deadline)
        .bind(story.is_active)
        .bind(story.version)
        .bind(story.created_at)
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;
        Self::insert_chapter(&mut tx, initial_chapter).await?;
        Self::insert_collaborator(&mut tx, owner).await?;

        tx.commit().await.map_err(infrastructure)?;
        debug!(story_id = %story.id, "story persisted");
        Ok(())
    }

    async fn load_story(&self, story_id: Uuid) -> Result<Option<Story>, DomainError> {
        sqlx::query_as::<_, StoryRow>(&format!("{SELECT_STORY} WHERE id = $1"))
            .bind(story_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?
            .map(Story::try_from)
            .transpose()
    }

    async fn stories_with_deadlines(&self) -> Result<Vec<Story>, DomainError> {
        sqlx::query_as::<_, StoryRow>(&format!(
            "{SELECT_STORY} WHERE proposal_deadline IS NOT NULL OR voting_deadline IS NOT NULL \
             ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?
        .into_iter()
        .map(Story::try_from)
        .collect()
    }

    async fn load_chapter(&self, chapter_id: Uuid) -> Result<Option<Chapter>, DomainError> {
        let row = sqlx::query_as::<_, ChapterRow>(&format!("{SELECT_CHAPTER} WHERE id = $1"))
            .bind(chapter_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(row.map(Chapter::from))
    }

    async fn last_chapter(&self, story_id: Uuid) -> Result<Option<Chapter>, DomainError> {
        let row = sqlx::query_as::<_, ChapterRow>(&format!(
            "{SELECT_CHAPTER} WHERE story_id = $1 AND is_last_chapter"
        ))
        .bind(story_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(row.map(Chapter::from))
    }

    async fn list_chapters(&self, story_id: Uuid) -> Result<Vec<Chapter>, DomainError> {
        let rows = sqlx::query_as::<_, ChapterRow>(&format!(
            "{SELECT_CHAPTER} WHERE story_id = $1 ORDER BY position"
        ))
        .bind(story_id)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(rows.into_iter().map(Chapter::from).collect())
    }

    async fn load_proposal(
        &self,
        proposal_id: Uuid,
    ) -> Result<Option<ChapterProposal>, DomainError> {
        let row = sqlx::query_as::<_, ProposalRow>(&format!("{SELECT_PROPOSAL} WHERE id = $1"))
            .bind(proposal_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(row.map(ChapterProposal::from))
    }

    async fn list_proposals(&self, story_id: Uuid) -> Result<Vec<ChapterProposal>, DomainError> {
        let rows = sqlx::query_as::<_, ProposalRow>(&format!(
            "{SELECT_PROPOSAL} WHERE story_id = $1 ORDER BY created_at, id"
        ))
        .bind(story_id)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(rows.into_iter().map(ChapterProposal::from).collect())
    }

    async fn find_vote(
        &self,
        proposal_id: Uuid,
        author_id: Uuid,
    ) -> Result<Option<Vote>, DomainError> {
        let row = sqlx::query_as::<_, VoteRow>(&format!(
            "{SELECT_VOTE} WHERE chapter_proposal_id = $1 AND author_id = $2"
        ))
        .bind(proposal_id)
        .bind(author_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(row.map(Vote::from))
    }

    async fn list_votes(&self, proposal_id: Uuid) -> Result<Vec<Vote>, DomainError> {
        let rows = sqlx::query_as::<_, VoteRow>(&format!(
            "{SELECT_VOTE} WHERE chapter_proposal_id = $1 ORDER BY created_at, id"
        ))
        .bind(proposal_id)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(rows.into_iter().map(Vote::from).collect())
    }

    async fn find_collaborator(
        &self,
        story_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Collaborator>, DomainError> {
        sqlx::query_as::<_, CollaboratorRow>(&format!(
            "{SELECT_COLLABORATOR} WHERE story_id = $1 AND user_id = $2"
        ))
        .bind(story_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)?
        .map(Collaborator::try_from)
        .transpose()
    }

    async fn list_collaborators(&self, story_id: Uuid) -> Result<Vec<Collaborator>, DomainError> {
        sqlx::query_as::<_, CollaboratorRow>(&format!(
            "{SELECT_COLLABORATOR} WHERE story_id = $1 ORDER BY user_id"
        ))
        .bind(story_id)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?
        .into_iter()
        .map(Collaborator::try_from)
        .collect()
    }

    async fn apply_changes(
        &self,
        story_id: Uuid,
        expected_version: i64,
        changes: &[StoreChange],
    ) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;

        let actual: Option<i64> =
            sqlx::query_scalar("SELECT version FROM stories WHERE id = $1 FOR UPDATE")
                .bind(story_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(infrastructure)?;
        let Some(actual) = actual else {
            return Err(DomainError::story_not_found(story_id));
        };
        if actual != expected_version {
            warn!(%story_id, expected_version, actual, "story version conflict");
            return Err(DomainError::ConcurrencyConflict {
                story_id,
                expected: expected_version,
                actual,
            });
        }

        for change in changes {
            Self::apply_change(&mut tx, story_id, change).await?;
        }

        sqlx::query("UPDATE stories SET version = version + 1 WHERE id = $1")
            .bind(story_id)
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?;
        tx.commit().await.map_err(infrastructure)?;

        debug!(
            %story_id,
            version = expected_version + 1,
            changes = changes.len(),
            "change batch committed"
        );
        Ok(())
    }
}
