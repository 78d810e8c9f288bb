//! End-to-end round flow through the HTTP surface, backed by the in-memory store.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{Value, json};
use storyloom_test_support::InMemoryStoryStore;
use uuid::Uuid;

async fn create_story(app: &axum::Router, admin_id: Uuid) -> (String, String) {
    let (status, story) = common::post_json(
        app.clone(),
        "/api/v1/stories",
        &json!({
            "author_id": admin_id,
            "title": "Tidewater",
            "proposal_time_ms": 60_000,
            "voting_time_ms": 30_000,
            "initial_chapter": { "title": "Low Tide", "content": "The harbor emptied overnight." }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let story_id = story["story_id"].as_str().unwrap().to_owned();

    let (_, chapters) =
        common::get_json(app.clone(), &format!("/api/v1/stories/{story_id}/chapters")).await;
    let parent_id = chapters[0]["id"].as_str().unwrap().to_owned();

    (story_id, parent_id)
}

async fn submit(app: &axum::Router, story_id: &str, parent_id: &str, title: &str) -> Value {
    let (status, proposal) = common::post_json(
        app.clone(),
        &format!("/api/v1/stories/{story_id}/proposals"),
        &json!({
            "parent_chapter_id": parent_id,
            "author_id": Uuid::new_v4(),
            "title": title,
            "content": format!("{title} continues the story."),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    proposal
}

#[tokio::test]
async fn test_second_proposal_sets_deadline_and_arms_timer() {
    // Arrange
    let app = common::build_test_app(Arc::new(InMemoryStoryStore::new()));
    let (story_id, parent_id) = create_story(&app, Uuid::new_v4()).await;

    // Act
    submit(&app, &story_id, &parent_id, "Driftwood").await;
    let (_, after_one) =
        common::get_json(app.clone(), &format!("/api/v1/stories/{story_id}")).await;
    submit(&app, &story_id, &parent_id, "Gulls").await;
    let (_, after_two) =
        common::get_json(app.clone(), &format!("/api/v1/stories/{story_id}")).await;
    let (_, health) = common::get_json(app.clone(), "/health").await;

    // Assert
    assert!(after_one["proposal_deadline"].is_null());
    assert_eq!(after_two["proposal_deadline"], "2026-01-15T10:01:00Z");
    assert_eq!(after_two["open_proposals"], 2);
    assert_eq!(health["armed_timers"], 1);
}

#[tokio::test]
async fn test_vote_during_proposal_phase_returns_409() {
    let app = common::build_test_app(Arc::new(InMemoryStoryStore::new()));
    let (story_id, parent_id) = create_story(&app, Uuid::new_v4()).await;
    let proposal = submit(&app, &story_id, &parent_id, "Driftwood").await;

    let (status, json) = common::post_json(
        app.clone(),
        &format!("/api/v1/proposals/{}/vote", proposal["id"].as_str().unwrap()),
        &json!({ "user_id": Uuid::new_v4() }),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "invalid_phase");
}

#[tokio::test]
async fn test_admin_select_winner_closes_round() {
    // Arrange
    let admin_id = Uuid::new_v4();
    let app = common::build_test_app(Arc::new(InMemoryStoryStore::new()));
    let (story_id, parent_id) = create_story(&app, admin_id).await;
    let winner = submit(&app, &story_id, &parent_id, "Driftwood").await;
    submit(&app, &story_id, &parent_id, "Gulls").await;
    let winner_id = winner["id"].as_str().unwrap();

    // Act
    let (status, chapter) = common::post_json(
        app.clone(),
        &format!("/api/v1/proposals/{winner_id}/select-winner"),
        &json!({ "caller_id": admin_id }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chapter["title"], "Driftwood");
    assert_eq!(chapter["position"], 2);
    assert_eq!(chapter["is_last_chapter"], true);

    let (_, chapters) =
        common::get_json(app.clone(), &format!("/api/v1/stories/{story_id}/chapters")).await;
    assert_eq!(chapters.as_array().unwrap().len(), 2);
    assert_eq!(chapters[0]["is_last_chapter"], false);

    let (_, story) = common::get_json(app.clone(), &format!("/api/v1/stories/{story_id}")).await;
    assert_eq!(story["current_phase"], "PROPOSAL");
    assert!(story["proposal_deadline"].is_null());
    assert_eq!(story["open_proposals"], 0);

    let (_, health) = common::get_json(app.clone(), "/health").await;
    assert_eq!(health["armed_timers"], 0);

    let (status, _) =
        common::get_json(app, &format!("/api/v1/proposals/{winner_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_select_winner_by_non_admin_returns_403() {
    let app = common::build_test_app(Arc::new(InMemoryStoryStore::new()));
    let (story_id, parent_id) = create_story(&app, Uuid::new_v4()).await;
    let proposal = submit(&app, &story_id, &parent_id, "Driftwood").await;

    let (status, json) = common::post_json(
        app,
        &format!("/api/v1/proposals/{}/select-winner", proposal["id"].as_str().unwrap()),
        &json!({ "caller_id": Uuid::new_v4() }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "forbidden");
}
