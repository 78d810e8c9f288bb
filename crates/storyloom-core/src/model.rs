//! Records owned by the persistent store.
//!
//! A story advances through rounds: a PROPOSAL phase collecting candidate
//! continuations, then a VOTING phase tallying preference among them. The
//! winner becomes the story's next chapter.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// The phase a story's current round is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Collecting continuations.
    Proposal,
    /// Tallying votes among collected continuations.
    Voting,
}

impl Phase {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proposal => "PROPOSAL",
            Self::Voting => "VOTING",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROPOSAL" => Ok(Self::Proposal),
            "VOTING" => Ok(Self::Voting),
            other => Err(DomainError::Infrastructure(format!(
                "unknown story phase: {other}"
            ))),
        }
    }
}

/// Rights a user holds on a specific story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollaboratorRole {
    /// Story owner; may pick winners and edit phase durations.
    Admin,
    /// Author of at least one winning proposal.
    User,
}

impl CollaboratorRole {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::User => "USER",
        }
    }
}

impl FromStr for CollaboratorRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Self::Admin),
            "USER" => Ok(Self::User),
            other => Err(DomainError::Infrastructure(format!(
                "unknown collaborator role: {other}"
            ))),
        }
    }
}

/// A collaboratively written story.
///
/// At most one of `proposal_deadline` / `voting_deadline` is set. A proposal
/// deadline implies the PROPOSAL phase with at least two open proposals; a
/// voting deadline implies the VOTING phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    /// Story identifier.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Phase of the current round.
    pub current_phase: Phase,
    /// Length of the proposal phase once it becomes time-bounded.
    pub proposal_time_ms: i64,
    /// Length of the voting phase.
    pub voting_time_ms: i64,
    /// When the proposal phase ends, if armed.
    pub proposal_deadline: Option<DateTime<Utc>>,
    /// When the voting phase ends, if armed.
    pub voting_deadline: Option<DateTime<Utc>>,
    /// Inactive stories no longer progress.
    pub is_active: bool,
    /// Optimistic concurrency version, bumped by every committed change batch.
    pub version: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Story {
    /// Proposal phase length as a time delta, saturating at `TimeDelta::MAX`.
    #[must_use]
    pub fn proposal_duration(&self) -> TimeDelta {
        TimeDelta::try_milliseconds(self.proposal_time_ms).unwrap_or(TimeDelta::MAX)
    }

    /// Voting phase length as a time delta, saturating at `TimeDelta::MAX`.
    #[must_use]
    pub fn voting_duration(&self) -> TimeDelta {
        TimeDelta::try_milliseconds(self.voting_time_ms).unwrap_or(TimeDelta::MAX)
    }

    /// Returns `true` if either phase deadline is set.
    #[must_use]
    pub fn has_pending_deadline(&self) -> bool {
        self.proposal_deadline.is_some() || self.voting_deadline.is_some()
    }
}

/// An accepted chapter. Immutable once written, except for losing the
/// `is_last_chapter` flag when a successor is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter identifier.
    pub id: Uuid,
    /// Owning story.
    pub story_id: Uuid,
    /// Author of the chapter.
    pub author_id: Uuid,
    /// Chapter title.
    pub title: String,
    /// Chapter text.
    pub content: String,
    /// 1-based position in the story.
    pub position: i32,
    /// Marks the tip of the accepted chain.
    pub is_last_chapter: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A candidate continuation submitted during the current round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterProposal {
    /// Proposal identifier.
    pub id: Uuid,
    /// Owning story.
    pub story_id: Uuid,
    /// The chapter this proposal continues.
    pub parent_chapter_id: Uuid,
    /// Proposal author.
    pub author_id: Uuid,
    /// Proposed title.
    pub title: String,
    /// Proposed text.
    pub content: String,
    /// Denormalized count of live votes.
    pub vote_count: i32,
    /// Submission time.
    pub created_at: DateTime<Utc>,
}

/// One user's vote for one proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Vote identifier.
    pub id: Uuid,
    /// The proposal voted for.
    pub chapter_proposal_id: Uuid,
    /// The voter.
    pub author_id: Uuid,
    /// When the vote was cast.
    pub created_at: DateTime<Utc>,
}

/// A user's rights on a story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    /// The story.
    pub story_id: Uuid,
    /// The user.
    pub user_id: Uuid,
    /// Granted role.
    pub role: CollaboratorRole,
}
