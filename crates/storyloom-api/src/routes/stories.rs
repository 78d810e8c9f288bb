//! Routes for stories: creation, reads, phase durations and proposal submission.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use storyloom_core::model::{Chapter, ChapterProposal, Collaborator};
use storyloom_progression::application::query_handlers::{self, ProposalPage, StoryView};
use storyloom_progression::domain::commands;
use tracing::instrument;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: usize = 20;

/// Opening chapter of a new story.
#[derive(Debug, Deserialize)]
pub struct InitialChapterRequest {
    /// Chapter title.
    pub title: String,
    /// Chapter text.
    pub content: String,
}

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateStoryRequest {
    /// The creator, who becomes the story's admin.
    pub author_id: Uuid,
    /// Story title.
    pub title: String,
    /// Proposal phase length in milliseconds.
    pub proposal_time_ms: Option<i64>,
    /// Voting phase length in milliseconds.
    pub voting_time_ms: Option<i64>,
    /// Chapter #1.
    pub initial_chapter: InitialChapterRequest,
}

/// Request body for POST /{story_id}/change-durations.
#[derive(Debug, Deserialize)]
pub struct ChangeDurationsRequest {
    /// Must be a story admin.
    pub caller_id: Uuid,
    /// New proposal phase length in milliseconds.
    pub proposal_time_ms: Option<i64>,
    /// New voting phase length in milliseconds.
    pub voting_time_ms: Option<i64>,
}

/// Request body for POST /{story_id}/proposals.
#[derive(Debug, Deserialize)]
pub struct SubmitProposalRequest {
    /// Must be the story's current last chapter.
    pub parent_chapter_id: Uuid,
    /// The proposing user.
    pub author_id: Uuid,
    /// Proposed title.
    pub title: String,
    /// Proposed text.
    pub content: String,
}

/// Query string for GET /{story_id}/proposals.
#[derive(Debug, Deserialize)]
pub struct PageParams {
    /// 1-based page number.
    pub page: Option<usize>,
    /// Items per page.
    pub page_size: Option<usize>,
}

/// POST /
#[instrument(skip(state, request), fields(author_id = %request.author_id))]
async fn create_story(
    State(state): State<AppState>,
    Json(request): Json<CreateStoryRequest>,
) -> Result<(StatusCode, Json<StoryView>), ApiError> {
    let command = commands::CreateStory {
        correlation_id: Uuid::new_v4(),
        author_id: request.author_id,
        title: request.title,
        proposal_time_ms: request.proposal_time_ms,
        voting_time_ms: request.voting_time_ms,
        initial_chapter_title: request.initial_chapter.title,
        initial_chapter_content: request.initial_chapter.content,
    };

    let story = state.engine.create_story(&command).await?;
    let view = query_handlers::get_story_by_id(story.id, state.engine.store()).await?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /{story_id}
async fn get_story(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
) -> Result<Json<StoryView>, ApiError> {
    let view = query_handlers::get_story_by_id(story_id, state.engine.store()).await?;
    Ok(Json(view))
}

/// POST /{story_id}/change-durations
#[instrument(skip(state, request), fields(story_id = %story_id))]
async fn change_durations(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Json(request): Json<ChangeDurationsRequest>,
) -> Result<Json<StoryView>, ApiError> {
    let command = commands::ChangePhaseDurations {
        correlation_id: Uuid::new_v4(),
        story_id,
        caller_id: request.caller_id,
        proposal_time_ms: request.proposal_time_ms,
        voting_time_ms: request.voting_time_ms,
    };

    state.engine.change_phase_durations(&command).await?;
    let view = query_handlers::get_story_by_id(story_id, state.engine.store()).await?;

    Ok(Json(view))
}

/// GET /{story_id}/chapters
async fn list_chapters(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
) -> Result<Json<Vec<Chapter>>, ApiError> {
    let chapters = query_handlers::list_chapters(story_id, state.engine.store()).await?;
    Ok(Json(chapters))
}

/// GET /{story_id}/collaborators
async fn list_collaborators(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
) -> Result<Json<Vec<Collaborator>>, ApiError> {
    let collaborators =
        query_handlers::list_collaborators(story_id, state.engine.store()).await?;
    Ok(Json(collaborators))
}

/// POST /{story_id}/proposals
#[instrument(skip(state, request), fields(story_id = %story_id))]
async fn submit_proposal(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Json(request): Json<SubmitProposalRequest>,
) -> Result<(StatusCode, Json<ChapterProposal>), ApiError> {
    let command = commands::SubmitProposal {
        correlation_id: Uuid::new_v4(),
        story_id,
        parent_chapter_id: request.parent_chapter_id,
        author_id: request.author_id,
        title: request.title,
        content: request.content,
    };

    let proposal = state.engine.submit_proposal(&command).await?;

    Ok((StatusCode::CREATED, Json(proposal)))
}

/// GET /{story_id}/proposals
async fn list_proposals(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> Result<Json<ProposalPage>, ApiError> {
    let page = query_handlers::list_proposals_paginated(
        story_id,
        params.page.unwrap_or(1),
        params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        state.engine.store(),
    )
    .await?;
    Ok(Json(page))
}

/// Returns the router for stories.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_story))
        .route("/{story_id}", get(get_story))
        .route("/{story_id}/change-durations", post(change_durations))
        .route("/{story_id}/chapters", get(list_chapters))
        .route("/{story_id}/collaborators", get(list_collaborators))
        .route(
            "/{story_id}/proposals",
            get(list_proposals).post(submit_proposal),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use storyloom_core::clock::Clock;
    use storyloom_core::rng::DeterministicRng;
    use storyloom_core::store::StoryStore;
    use storyloom_progression::application::orchestrator::Orchestrator;
    use storyloom_progression::config::ProgressionConfig;
    use storyloom_test_support::{FailingStoryStore, FixedClock, InMemoryStoryStore, MockRng};
    use tower::ServiceExt;

    fn app_state_with(store: Arc<dyn StoryStore>) -> AppState {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ));
        let rng: Arc<Mutex<dyn DeterministicRng>> = Arc::new(Mutex::new(MockRng));
        AppState::new(Orchestrator::new(
            store,
            clock,
            rng,
            ProgressionConfig::default(),
        ))
    }

    fn post(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn json_of(response: axum::response::Response) -> Value {
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body_bytes).unwrap()
    }

    fn create_body() -> Value {
        serde_json::json!({
            "author_id": Uuid::new_v4(),
            "title": "Glass Orchard",
            "proposal_time_ms": 60_000,
            "initial_chapter": { "title": "Seed", "content": "Nothing grew there until spring." }
        })
    }

    #[tokio::test]
    async fn test_create_story_returns_201_with_view() {
        // Arrange
        let app = router().with_state(app_state_with(Arc::new(InMemoryStoryStore::new())));

        // Act
        let response = app.oneshot(post("/", &create_body())).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = json_of(response).await;
        assert_eq!(json["title"], "Glass Orchard");
        assert_eq!(json["current_phase"], "PROPOSAL");
        assert_eq!(json["proposal_time_ms"], 60_000);
        assert_eq!(json["voting_time_ms"], 86_400_000);
        assert_eq!(json["chapter_count"], 1);
    }

    #[tokio::test]
    async fn test_create_story_returns_400_for_empty_title() {
        let app = router().with_state(app_state_with(Arc::new(InMemoryStoryStore::new())));
        let mut body = create_body();
        body["title"] = Value::from("");

        let response = app.oneshot(post("/", &body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(response).await["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_create_story_returns_422_for_missing_fields() {
        let app = router().with_state(app_state_with(Arc::new(InMemoryStoryStore::new())));

        let response = app
            .oneshot(post("/", &serde_json::json!({ "title": "No author" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_get_story_returns_404_for_unknown_id() {
        let app = router().with_state(app_state_with(Arc::new(InMemoryStoryStore::new())));
        let request = Request::builder()
            .uri(format!("/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_of(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn test_submit_proposal_returns_500_when_store_fails() {
        let app = router().with_state(app_state_with(Arc::new(FailingStoryStore)));
        let body = serde_json::json!({
            "parent_chapter_id": Uuid::new_v4(),
            "author_id": Uuid::new_v4(),
            "title": "Frost",
            "content": "The first frost came early."
        });

        let response = app
            .oneshot(post(&format!("/{}/proposals", Uuid::new_v4()), &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_of(response).await["error"], "infrastructure_error");
    }

    #[tokio::test]
    async fn test_list_proposals_rejects_oversized_page() {
        // Arrange
        let state = app_state_with(Arc::new(InMemoryStoryStore::new()));
        let created = router()
            .with_state(state.clone())
            .oneshot(post("/", &create_body()))
            .await
            .unwrap();
        let story_id = json_of(created).await["story_id"]
            .as_str()
            .unwrap()
            .to_owned();
        let request = Request::builder()
            .uri(format!("/{story_id}/proposals?page=1&page_size=500"))
            .body(Body::empty())
            .unwrap();

        // Act
        let response = router().with_state(state).oneshot(request).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
