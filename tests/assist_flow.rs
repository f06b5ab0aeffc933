mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, TestApp};
use diesel::prelude::*;
use helpdesk::ai::ChatRole;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct AssistResponse {
    response: String,
}

async fn publish_article(app: &TestApp, title: &str, content: &str) -> Result<()> {
    let response = app
        .post_json(
            "/api/articles",
            &json!({ "title": title, "content": content, "isPublished": true }),
            Some("agent-1"),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    Ok(())
}

async fn chat_message_count(app: &TestApp) -> Result<i64> {
    app.with_conn(|conn| {
        use helpdesk::schema::chat_messages::dsl::chat_messages;
        chat_messages
            .count()
            .get_result(conn)
            .context("failed to count chat messages")
    })
    .await
}

#[tokio::test]
async fn assist_grounds_replies_in_relevant_articles() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("agent-1", "Agent Smith", "agent").await?;
    publish_article(
        &app,
        "Password reset help",
        "Reset your password from the sign-in page using the forgot password link.",
    )
    .await?;
    publish_article(&app, "Shipping times", "Orders ship within two days.").await?;

    // Drafts get embeddings too, but retrieval must never surface them.
    let draft = app
        .post_json(
            "/api/articles",
            &json!({
                "title": "Password reset runbook",
                "content": "Internal steps for a manual password reset."
            }),
            Some("agent-1"),
        )
        .await?;
    assert_eq!(draft.status(), StatusCode::CREATED);

    app.ai().set_reply("Use the forgot password link.").await;

    let response = app
        .post_json(
            "/api/assist",
            &json!({ "query": "how do I reset my password" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let parsed: AssistResponse = serde_json::from_slice(&body)?;
    assert_eq!(parsed.response, "Use the forgot password link.");

    // The matching article was handed to the model as context, ahead of
    // everything else.
    let requests = app.ai().requests().await;
    let turns = requests.last().expect("a completion request was made");
    assert_eq!(turns[0].role, ChatRole::System);
    assert!(turns[0].content.contains("Article: Password reset help"));
    assert!(!turns[0].content.contains("Password reset runbook"));
    assert_eq!(turns.last().expect("user turn").content, "how do I reset my password");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn assist_sees_article_edits_immediately() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("agent-1", "Agent Smith", "agent").await?;

    let created = app
        .post_json(
            "/api/articles",
            &json!({ "title": "Opening hours", "content": "We are open weekdays.", "isPublished": true }),
            Some("agent-1"),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = body_to_vec(created.into_body()).await?;
    let article: serde_json::Value = serde_json::from_slice(&body)?;
    let article_id = article["id"].as_str().expect("article id");

    // The edit recomputes the embedding, so a phrase unique to the new text
    // pulls the article into context on the very next query.
    let updated = app
        .patch_json(
            &format!("/api/articles/{article_id}"),
            &json!({ "content": "We are also open on zebra-striped holidays." }),
            Some("agent-1"),
        )
        .await?;
    assert_eq!(updated.status(), StatusCode::OK);

    let response = app
        .post_json(
            "/api/assist",
            &json!({ "query": "are you open on zebra-striped holidays" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let requests = app.ai().requests().await;
    let turns = requests.last().expect("completion request");
    assert!(turns[0].content.contains("Article: Opening hours"));
    assert!(turns[0].content.contains("zebra-striped"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn assist_answers_even_without_any_articles() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.ai().set_reply("I don't have articles on that yet.").await;

    let response = app
        .post_json("/api/assist", &json!({ "query": "anybody home?" }), None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let parsed: AssistResponse = serde_json::from_slice(&body)?;
    assert_eq!(parsed.response, "I don't have articles on that yet.");

    // Without matches the request starts straight at the assistant prompt.
    let requests = app.ai().requests().await;
    let turns = requests.last().expect("a completion request was made");
    assert_eq!(turns[0].role, ChatRole::System);
    assert!(!turns[0].content.contains("Article:"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn assist_rejects_missing_or_blank_queries() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let blank = app
        .post_json("/api/assist", &json!({ "query": "   " }), None)
        .await?;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

    let missing = app.post_json("/api/assist", &json!({}), None).await?;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn assist_sessions_replay_history() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.ai().set_reply("First answer.").await;
    let first = app
        .post_json(
            "/api/assist",
            &json!({ "query": "what are your hours", "sessionId": "sess-history" }),
            None,
        )
        .await?;
    assert_eq!(first.status(), StatusCode::OK);

    app.ai().set_reply("Second answer.").await;
    let second = app
        .post_json(
            "/api/assist",
            &json!({ "query": "and on weekends?", "sessionId": "sess-history" }),
            None,
        )
        .await?;
    assert_eq!(second.status(), StatusCode::OK);

    // The second completion saw the first exchange as history.
    let requests = app.ai().requests().await;
    let turns = requests.last().expect("second completion request");
    let transcript: Vec<(&ChatRole, &str)> = turns
        .iter()
        .map(|turn| (&turn.role, turn.content.as_str()))
        .collect();
    assert!(transcript.contains(&(&ChatRole::User, "what are your hours")));
    assert!(transcript.contains(&(&ChatRole::Assistant, "First answer.")));
    assert_eq!(turns.last().expect("user turn").content, "and on weekends?");

    // Two user turns plus two assistant turns, all durable.
    assert_eq!(chat_message_count(&app).await?, 4);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn assist_stream_emits_chunks_then_terminator() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("agent-1", "Agent Smith", "agent").await?;
    publish_article(&app, "Shipping times", "Orders ship within two days.").await?;

    app.ai().set_reply("Orders ship within two days.").await;

    let response = app
        .get(
            "/api/assist/stream?q=how%20long%20does%20shipping%20take&sessionId=sess-stream",
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_to_vec(response.into_body()).await?;
    let body = String::from_utf8(body)?;
    assert!(body.contains(r#"{"text":"#), "no text chunks in: {body}");
    assert!(body.contains("[DONE]"), "missing terminator in: {body}");

    // The streamed exchange is durable like the single-shot one.
    assert_eq!(chat_message_count(&app).await?, 2);

    let missing_query = app.get("/api/assist/stream", None).await?;
    assert_eq!(missing_query.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}
