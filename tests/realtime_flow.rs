mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, TestApp};
use diesel::prelude::*;
use helpdesk::models::User;
use helpdesk::realtime::events::{ClientEvent, ServerEvent};
use helpdesk::realtime::rooms::chat_room;
use helpdesk::realtime::dispatch;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

async fn load_user(app: &TestApp, auth_id: &str) -> Result<User> {
    let auth_id = auth_id.to_string();
    app.with_conn(move |conn| {
        use helpdesk::schema::users::dsl::*;
        users
            .filter(external_auth_id.eq(auth_id))
            .first(conn)
            .context("user not found")
    })
    .await
}

async fn ticket_status(app: &TestApp, ticket: Uuid) -> Result<String> {
    app.with_conn(move |conn| {
        use helpdesk::schema::tickets::dsl::*;
        tickets
            .find(ticket)
            .select(status)
            .first(conn)
            .context("ticket not found")
    })
    .await
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

async fn create_ticket(app: &TestApp, auth_id: &str) -> Result<Uuid> {
    let response = app
        .post_json(
            "/api/tickets",
            &json!({ "subject": "Socket test", "description": "something broke" }),
            Some(auth_id),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_to_vec(response.into_body()).await?;
    let ticket: serde_json::Value = serde_json::from_slice(&body)?;
    Ok(ticket["id"].as_str().context("ticket id")?.parse()?)
}

#[tokio::test]
async fn socket_messages_reopen_pending_tickets() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("visitor-1", "Vis Itor", "visitor").await?;
    app.insert_user("agent-1", "Agent Smith", "agent").await?;
    let visitor = load_user(&app, "visitor-1").await?;

    let ticket_id = create_ticket(&app, "visitor-1").await?;
    let parked = app
        .patch_json(
            &format!("/api/tickets/{ticket_id}/status"),
            &json!({ "status": "pending" }),
            Some("agent-1"),
        )
        .await?;
    assert_eq!(parked.status(), StatusCode::OK);

    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    dispatch(
        &app.state,
        &visitor,
        connection_id,
        &tx,
        ClientEvent::JoinTicket { ticket_id },
    )
    .await;
    dispatch(
        &app.state,
        &visitor,
        connection_id,
        &tx,
        ClientEvent::TicketMessage {
            ticket_id,
            content: "still broken".to_string(),
        },
    )
    .await;

    // The persisted message fans out to the room, enriched with the author.
    match rx.recv().await.context("expected a broadcast")? {
        ServerEvent::TicketMessage(broadcast) => {
            assert_eq!(broadcast.ticket_id, ticket_id);
            assert_eq!(broadcast.content, "still broken");
            assert_eq!(broadcast.author_id, Some(visitor.id));
            assert_eq!(
                broadcast.author.as_ref().map(|author| author.name.as_str()),
                Some("Vis Itor")
            );
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // The visitor's reply put the pending ticket back in the agents' court.
    assert_eq!(ticket_status(&app, ticket_id).await?, "open");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn socket_status_updates_are_agent_only() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("visitor-1", "Vis Itor", "visitor").await?;
    app.insert_user("agent-1", "Agent Smith", "agent").await?;
    let visitor = load_user(&app, "visitor-1").await?;
    let agent = load_user(&app, "agent-1").await?;

    let ticket_id = create_ticket(&app, "visitor-1").await?;

    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // A visitor's attempt is rejected with an error event, not applied.
    dispatch(
        &app.state,
        &visitor,
        connection_id,
        &tx,
        ClientEvent::UpdateTicketStatus {
            ticket_id,
            status: "solved".to_string(),
        },
    )
    .await;
    assert!(matches!(
        rx.recv().await.context("expected an event")?,
        ServerEvent::Error { .. }
    ));
    assert_eq!(ticket_status(&app, ticket_id).await?, "open");

    // Unknown values are rejected even for agents.
    dispatch(
        &app.state,
        &agent,
        connection_id,
        &tx,
        ClientEvent::UpdateTicketStatus {
            ticket_id,
            status: "closed".to_string(),
        },
    )
    .await;
    assert!(matches!(
        rx.recv().await.context("expected an event")?,
        ServerEvent::Error { .. }
    ));

    // An agent's valid update lands and is broadcast to the room.
    dispatch(
        &app.state,
        &visitor,
        connection_id,
        &tx,
        ClientEvent::JoinTicket { ticket_id },
    )
    .await;
    dispatch(
        &app.state,
        &agent,
        connection_id,
        &tx,
        ClientEvent::UpdateTicketStatus {
            ticket_id,
            status: "pending".to_string(),
        },
    )
    .await;
    match rx.recv().await.context("expected a broadcast")? {
        ServerEvent::TicketUpdated {
            ticket_id: updated_id,
            status,
        } => {
            assert_eq!(updated_id, ticket_id);
            assert_eq!(status, "pending");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(ticket_status(&app, ticket_id).await?, "pending");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn socket_ai_messages_stream_and_persist() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("visitor-1", "Vis Itor", "visitor").await?;
    let visitor = load_user(&app, "visitor-1").await?;

    app.ai().set_reply("We are open on weekdays.").await;

    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    dispatch(
        &app.state,
        &visitor,
        connection_id,
        &tx,
        ClientEvent::AiMessage {
            session_id: "ws-session".to_string(),
            message: "what are your hours".to_string(),
        },
    )
    .await;

    // Ack first, then chunks until the terminal one.
    assert!(matches!(
        rx.recv().await.context("expected an event")?,
        ServerEvent::AiMessageReceived { .. }
    ));

    let mut reply = String::new();
    loop {
        match rx.recv().await.context("expected a chunk")? {
            ServerEvent::AiMessageChunk {
                content,
                done,
                session_id,
            } => {
                assert_eq!(session_id, "ws-session");
                reply.push_str(&content);
                if done {
                    break;
                }
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(reply, "We are open on weekdays.");

    // Both turns are durable.
    assert_eq!(chat_message_count(&app).await?, 2);

    // The exchange over, the connection is out of the session room and no
    // longer receives its broadcasts.
    app.state.rooms.broadcast(
        &chat_room("ws-session"),
        &ServerEvent::AiMessageReceived {
            session_id: "ws-session".to_string(),
        },
    );
    assert!(rx.try_recv().is_err());

    app.cleanup().await?;
    Ok(())
}
