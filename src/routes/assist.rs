//! The public AI assistant endpoints. Both variants ground the reply in the
//! knowledge base; passing a session token makes the conversation durable
//! and replays prior turns as context.

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::{
    ai::{self, ChatTurn},
    error::{AppError, AppResult},
    models::ChatSession,
    state::AppState,
    store,
};

/// Marks the end of the SSE stream; the payload before it is complete.
const STREAM_TERMINATOR: &str = "[DONE]";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistRequest {
    pub query: Option<String>,
    pub session_id: Option<String>,
}

#[derive(serde::Serialize)]
pub struct AssistResponse {
    pub response: String,
}

pub async fn assist(
    State(state): State<AppState>,
    Json(payload): Json<AssistRequest>,
) -> AppResult<Json<AssistResponse>> {
    let query = require_query(payload.query.as_deref())?;
    let (session, history) = open_session(&state, payload.session_id.as_deref(), &query)?;

    let response = ai::chat_completion(&state, history, &query).await;

    if let Some(session) = session {
        persist_reply(&state, &session, &response);
    }

    Ok(Json(AssistResponse { response }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistStreamQuery {
    pub q: Option<String>,
    pub session_id: Option<String>,
}

/// Server-sent events variant: one `{"text": ...}` event per fragment, then
/// a literal `[DONE]`.
pub async fn assist_stream(
    State(state): State<AppState>,
    Query(params): Query<AssistStreamQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let query = require_query(params.q.as_deref())?;
    let (session, history) = open_session(&state, params.session_id.as_deref(), &query)?;

    let mut chunks = ai::stream_chat_response(state.clone(), history, query);
    let (tx, rx) = mpsc::channel::<Event>(32);

    tokio::spawn(async move {
        let mut reply = String::new();
        while let Some(chunk) = chunks.recv().await {
            if !chunk.content.is_empty() {
                reply.push_str(&chunk.content);
                let event = Event::default().data(json!({ "text": chunk.content }).to_string());
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            if chunk.done {
                let _ = tx.send(Event::default().data(STREAM_TERMINATOR)).await;
                break;
            }
        }
        if let Some(session) = session {
            persist_reply(&state, &session, &reply);
        }
    });

    let stream = ReceiverStream::new(rx).map(Ok);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn require_query(raw: Option<&str>) -> Result<String, AppError> {
    let query = raw.map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(AppError::bad_request("query is required"));
    }
    Ok(query.to_string())
}

/// Resolves the optional session token: loads prior turns as history and
/// records the incoming user message. Anonymous requests get no history.
fn open_session(
    state: &AppState,
    session_token: Option<&str>,
    query: &str,
) -> AppResult<(Option<ChatSession>, Vec<ChatTurn>)> {
    let Some(token) = session_token.map(str::trim).filter(|token| !token.is_empty()) else {
        return Ok((None, Vec::new()));
    };

    let mut conn = state.db()?;
    let session = store::ensure_chat_session(&mut conn, token, None)?;
    let history = store::load_chat_history(&mut conn, session.id)?;
    store::append_chat_message(&mut conn, &session, query, true)?;
    Ok((Some(session), history))
}

fn persist_reply(state: &AppState, session: &ChatSession, reply: &str) {
    if reply.is_empty() {
        return;
    }
    let result = state
        .db()
        .and_then(|mut conn| Ok(store::append_chat_message(&mut conn, session, reply, false)?));
    if let Err(err) = result {
        warn!(session_id = %session.id, status = %err.status(), "failed to persist assistant reply");
    }
}
