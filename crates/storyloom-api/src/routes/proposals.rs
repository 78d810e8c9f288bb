//! Routes for proposals of an open round: reads, edits, votes and admin
//! winner selection.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use storyloom_core::model::{Chapter, ChapterProposal, Vote};
use storyloom_progression::application::query_handlers::{self, ProposalView};
use storyloom_progression::domain::commands;
use tracing::instrument;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for PATCH /{proposal_id}.
#[derive(Debug, Deserialize)]
pub struct EditProposalRequest {
    /// Must be the proposal's author.
    pub author_id: Uuid,
    /// Replacement title.
    pub title: Option<String>,
    /// Replacement text.
    pub content: Option<String>,
}

/// Request body for POST /{proposal_id}/withdraw.
#[derive(Debug, Deserialize)]
pub struct WithdrawProposalRequest {
    /// Must be the proposal's author.
    pub author_id: Uuid,
}

/// Request body for POST /{proposal_id}/vote and /{proposal_id}/retract-vote.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    /// The voter.
    pub user_id: Uuid,
}

/// Request body for POST /{proposal_id}/select-winner.
#[derive(Debug, Deserialize)]
pub struct SelectWinnerRequest {
    /// Must be an admin of the proposal's story.
    pub caller_id: Uuid,
}

/// GET /{proposal_id}
async fn get_proposal(
    State(state): State<AppState>,
    Path(proposal_id): Path<Uuid>,
) -> Result<Json<ProposalView>, ApiError> {
    let view = query_handlers::get_proposal_by_id(proposal_id, state.engine.store()).await?;
    Ok(Json(view))
}

/// PATCH /{proposal_id}
#[instrument(skip(state, request), fields(proposal_id = %proposal_id))]
async fn edit_proposal(
    State(state): State<AppState>,
    Path(proposal_id): Path<Uuid>,
    Json(request): Json<EditProposalRequest>,
) -> Result<Json<ChapterProposal>, ApiError> {
    let command = commands::EditProposal {
        correlation_id: Uuid::new_v4(),
        proposal_id,
        author_id: request.author_id,
        title: request.title,
        content: request.content,
    };

    let proposal = state.engine.edit_proposal(&command).await?;
    Ok(Json(proposal))
}

/// POST /{proposal_id}/withdraw
#[instrument(skip(state, request), fields(proposal_id = %proposal_id))]
async fn withdraw_proposal(
    State(state): State<AppState>,
    Path(proposal_id): Path<Uuid>,
    Json(request): Json<WithdrawProposalRequest>,
) -> Result<StatusCode, ApiError> {
    let command = commands::WithdrawProposal {
        correlation_id: Uuid::new_v4(),
        proposal_id,
        author_id: request.author_id,
    };

    state.engine.withdraw_proposal(&command).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /{proposal_id}/vote
#[instrument(skip(state, request), fields(proposal_id = %proposal_id))]
async fn cast_vote(
    State(state): State<AppState>,
    Path(proposal_id): Path<Uuid>,
    Json(request): Json<VoteRequest>,
) -> Result<(StatusCode, Json<Vote>), ApiError> {
    let command = commands::CastVote {
        correlation_id: Uuid::new_v4(),
        proposal_id,
        user_id: request.user_id,
    };

    let vote = state.engine.cast_vote(&command).await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

/// POST /{proposal_id}/retract-vote
#[instrument(skip(state, request), fields(proposal_id = %proposal_id))]
async fn retract_vote(
    State(state): State<AppState>,
    Path(proposal_id): Path<Uuid>,
    Json(request): Json<VoteRequest>,
) -> Result<StatusCode, ApiError> {
    let command = commands::RetractVote {
        correlation_id: Uuid::new_v4(),
        proposal_id,
        user_id: request.user_id,
    };

    state.engine.retract_vote(&command).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /{proposal_id}/select-winner
#[instrument(skip(state, request), fields(proposal_id = %proposal_id))]
async fn select_winner(
    State(state): State<AppState>,
    Path(proposal_id): Path<Uuid>,
    Json(request): Json<SelectWinnerRequest>,
) -> Result<Json<Chapter>, ApiError> {
    let command = commands::SelectWinner {
        correlation_id: Uuid::new_v4(),
        proposal_id,
        caller_id: request.caller_id,
    };

    let chapter = state.engine.admin_select_winner(&command).await?;
    Ok(Json(chapter))
}

/// Returns the router for proposals.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{proposal_id}", get(get_proposal).patch(edit_proposal))
        .route("/{proposal_id}/withdraw", post(withdraw_proposal))
        .route("/{proposal_id}/vote", post(cast_vote))
        .route("/{proposal_id}/retract-vote", post(retract_vote))
        .route("/{proposal_id}/select-winner", post(select_winner))
}
