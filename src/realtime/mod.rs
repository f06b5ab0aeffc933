//! WebSocket endpoint for live ticket conversations and streamed AI chat.
//! One room per ticket, one ad hoc room per AI exchange. Handler failures
//! are reported to the originating connection as an `error` event and never
//! tear down the connection.

pub mod events;
pub mod rooms;

use anyhow::{bail, Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    ai,
    auth::{self, policy},
    error::{AppError, AppResult},
    models::{is_valid_status, User},
    state::AppState,
    store,
};

use events::{AuthorInfo, ClientEvent, ServerEvent, TicketMessageBroadcast};
use rooms::{chat_room, ticket_room};

#[derive(Deserialize)]
pub struct HandshakeQuery {
    /// External auth id of the connecting user.
    pub user: String,
}

/// `GET /ws?user=<external auth id>`. Connections without a resolvable
/// identity are rejected before the upgrade.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(handshake): Query<HandshakeQuery>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let mut conn = state.db()?;
    let user = auth::lookup_user(&mut conn, &handshake.user)?.ok_or_else(AppError::unauthorized)?;
    drop(conn);

    Ok(ws.on_upgrade(move |socket| handle_connection(state, user, socket)))
}

async fn handle_connection(state: AppState, user: User, socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    debug!(%connection_id, user_id = %user.id, "realtime client connected");

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "failed to encode realtime event");
                    continue;
                }
            };
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(_) => break,
        };
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => dispatch(&state, &user, connection_id, &tx, event).await,
                Err(err) => {
                    debug!(error = %err, "unparseable realtime frame");
                    send_error(&tx, "unrecognized event");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.rooms.leave_all(connection_id);
    writer.abort();
    debug!(%connection_id, "realtime client disconnected");
}

pub async fn dispatch(
    state: &AppState,
    user: &User,
    connection_id: Uuid,
    tx: &UnboundedSender<ServerEvent>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinTicket { ticket_id } => {
            state
                .rooms
                .join(&ticket_room(ticket_id), connection_id, tx.clone());
        }
        ClientEvent::LeaveTicket { ticket_id } => {
            state.rooms.leave(&ticket_room(ticket_id), connection_id);
        }
        ClientEvent::TicketMessage { ticket_id, content } => {
            if let Err(err) = on_ticket_message(state, user, ticket_id, &content).await {
                warn!(error = %err, %ticket_id, "ticket message over socket failed");
                send_error(tx, "failed to send message");
            }
        }
        ClientEvent::UpdateTicketStatus { ticket_id, status } => {
            if let Err(err) = on_update_ticket_status(state, user, ticket_id, &status).await {
                warn!(error = %err, %ticket_id, "status update over socket failed");
                send_error(tx, "failed to update ticket status");
            }
        }
        ClientEvent::AiMessage {
            session_id,
            message,
        } => {
            if let Err(err) =
                on_ai_message(state, user, connection_id, tx, &session_id, &message).await
            {
                warn!(error = %err, session_id, "ai message over socket failed");
                send_error(tx, "failed to process AI message");
            }
        }
    }
}

fn send_error(tx: &UnboundedSender<ServerEvent>, message: &str) {
    let _ = tx.send(ServerEvent::Error {
        message: message.to_string(),
    });
}

/// Same validation and invariants as the REST message path, then fan-out of
/// the enriched message to everyone in the ticket's room, sender included.
async fn on_ticket_message(
    state: &AppState,
    user: &User,
    ticket_id: Uuid,
    content: &str,
) -> Result<()> {
    if content.trim().is_empty() {
        bail!("message content must not be empty");
    }

    let mut conn = state.pool.get().context("database pool")?;
    let ticket = store::find_ticket(&mut conn, ticket_id)?.context("ticket not found")?;
    if !policy::can_access_ticket(user, &ticket) {
        bail!("user may not post to this ticket");
    }

    let message = store::post_ticket_message(&mut conn, &ticket, user, content.trim(), false)?;
    drop(conn);

    let broadcast = TicketMessageBroadcast {
        id: message.id,
        ticket_id: message.ticket_id,
        author_id: message.author_id,
        content: message.content,
        is_from_ai: message.is_from_ai,
        created_at: message.created_at,
        author: Some(AuthorInfo {
            id: user.id,
            name: user.name.clone(),
            role: user.role.clone(),
        }),
    };
    state
        .rooms
        .broadcast(&ticket_room(ticket_id), &ServerEvent::TicketMessage(broadcast));
    Ok(())
}

async fn on_update_ticket_status(
    state: &AppState,
    user: &User,
    ticket_id: Uuid,
    status: &str,
) -> Result<()> {
    if !is_valid_status(status) {
        bail!("invalid status {status:?}");
    }
    if !policy::can_change_ticket_status(user) {
        bail!("only agents may change ticket status");
    }

    let mut conn = state.pool.get().context("database pool")?;
    let updated = store::update_ticket_status(&mut conn, ticket_id, status)?;
    drop(conn);

    let ticket = updated.context("ticket not found")?;
    state.rooms.broadcast(
        &ticket_room(ticket_id),
        &ServerEvent::TicketUpdated {
            ticket_id: ticket.id,
            status: ticket.status,
        },
    );
    Ok(())
}

/// Acknowledges the message, joins the session room for the duration of the
/// exchange, streams the reply chunk-by-chunk, then leaves the room once the
/// terminal chunk has gone out. Both turns are persisted to the session.
async fn on_ai_message(
    state: &AppState,
    user: &User,
    connection_id: Uuid,
    tx: &UnboundedSender<ServerEvent>,
    session_id: &str,
    message: &str,
) -> Result<()> {
    if message.trim().is_empty() {
        bail!("message must not be empty");
    }

    let _ = tx.send(ServerEvent::AiMessageReceived {
        session_id: session_id.to_string(),
    });

    let mut conn = state.pool.get().context("database pool")?;
    let session = store::ensure_chat_session(&mut conn, session_id, Some(user.id))?;
    let history = store::load_chat_history(&mut conn, session.id)?;
    store::append_chat_message(&mut conn, &session, message, true)?;
    drop(conn);

    // Join only once the session rows exist: every exit past this point
    // goes through the leave below, so an error cannot strand the
    // connection in the room.
    let room = chat_room(session_id);
    state.rooms.join(&room, connection_id, tx.clone());

    let mut chunks = ai::stream_chat_response(state.clone(), history, message.to_string());
    let mut reply = String::new();
    while let Some(chunk) = chunks.recv().await {
        reply.push_str(&chunk.content);
        let done = chunk.done;
        state.rooms.broadcast(
            &room,
            &ServerEvent::AiMessageChunk {
                content: chunk.content,
                done,
                session_id: session_id.to_string(),
            },
        );
        if done {
            break;
        }
    }

    state.rooms.leave(&room, connection_id);

    if !reply.is_empty() {
        let mut conn = state.pool.get().context("database pool")?;
        store::append_chat_message(&mut conn, &session, &reply, false)?;
    }
    Ok(())
}
