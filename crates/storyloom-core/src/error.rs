//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type returned by every engine operation.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A story, chapter, proposal or vote does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record that was looked up.
        entity: &'static str,
        /// The identifier that was looked up.
        id: Uuid,
    },

    /// The operation is not allowed in the story's current phase.
    #[error("invalid phase: {0}")]
    InvalidPhase(String),

    /// The caller lacks the rights required for the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The request collides with existing state (duplicate vote, stale parent).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Optimistic concurrency conflict on a story's version.
    #[error(
        "concurrency conflict on story {story_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// The story that had the conflict.
        story_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Shorthand for a missing story.
    #[must_use]
    pub fn story_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "story",
            id,
        }
    }

    /// Shorthand for a missing proposal.
    #[must_use]
    pub fn proposal_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "proposal",
            id,
        }
    }

    /// Returns `true` for failures of the persistence layer rather than of the
    /// request itself.
    #[must_use]
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::Infrastructure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_entity_and_id() {
        let id = Uuid::nil();
        let err = DomainError::story_not_found(id);
        assert_eq!(err.to_string(), format!("story not found: {id}"));
    }

    #[test]
    fn test_store_failures_are_distinguished_from_request_errors() {
        assert!(DomainError::Infrastructure("db down".into()).is_store_failure());
        assert!(
            DomainError::ConcurrencyConflict {
                story_id: Uuid::nil(),
                expected: 1,
                actual: 2,
            }
            .is_store_failure()
        );
        assert!(!DomainError::Conflict("duplicate vote".into()).is_store_failure());
        assert!(!DomainError::InvalidPhase("not voting".into()).is_store_failure());
    }
}
