//! Persistence helpers shared by the REST handlers and the realtime layer,
//! so both paths enforce the same ticket invariants.

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::ai::ChatTurn;
use crate::auth::policy;
use crate::models::{
    ChatMessage, ChatSession, NewChatMessage, NewChatSession, NewTicketMessage, Ticket,
    TicketMessage, User, STATUS_OPEN, STATUS_PENDING,
};
use crate::schema::{chat_messages, chat_sessions, ticket_messages, tickets};

pub fn find_ticket(conn: &mut PgConnection, ticket_id: Uuid) -> QueryResult<Option<Ticket>> {
    tickets::table.find(ticket_id).first(conn).optional()
}

/// Appends a message to a ticket's conversation, touches the ticket's
/// `updated_at`, and applies the reply rule: a visitor answering a `pending`
/// ticket puts it back in the agents' court (`open`). The transition is a
/// conditional update so a concurrent status change cannot be clobbered.
pub fn post_ticket_message(
    conn: &mut PgConnection,
    ticket: &Ticket,
    author: &User,
    content: &str,
    is_from_ai: bool,
) -> QueryResult<TicketMessage> {
    let new_message = NewTicketMessage {
        id: Uuid::new_v4(),
        ticket_id: ticket.id,
        author_id: Some(author.id),
        content: content.to_string(),
        is_from_ai,
    };

    diesel::insert_into(ticket_messages::table)
        .values(&new_message)
        .execute(conn)?;

    let now = Utc::now().naive_utc();
    diesel::update(tickets::table.find(ticket.id))
        .set(tickets::updated_at.eq(now))
        .execute(conn)?;

    if !policy::is_agent(author) && ticket.status == STATUS_PENDING {
        diesel::update(
            tickets::table
                .find(ticket.id)
                .filter(tickets::status.eq(STATUS_PENDING)),
        )
        .set((tickets::status.eq(STATUS_OPEN), tickets::updated_at.eq(now)))
        .execute(conn)?;
    }

    ticket_messages::table.find(new_message.id).first(conn)
}

/// Sets a (pre-validated) status. Returns `None` when the ticket is gone.
pub fn update_ticket_status(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    status: &str,
) -> QueryResult<Option<Ticket>> {
    let updated = diesel::update(tickets::table.find(ticket_id))
        .set((
            tickets::status.eq(status),
            tickets::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;

    if updated == 0 {
        return Ok(None);
    }
    find_ticket(conn, ticket_id)
}

pub fn assign_ticket(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    assignee_id: Option<Uuid>,
) -> QueryResult<Option<Ticket>> {
    let updated = diesel::update(tickets::table.find(ticket_id))
        .set((
            tickets::assignee_id.eq(assignee_id),
            tickets::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;

    if updated == 0 {
        return Ok(None);
    }
    find_ticket(conn, ticket_id)
}

/// Finds or creates the session row behind an opaque client token.
pub fn ensure_chat_session(
    conn: &mut PgConnection,
    session_token: &str,
    user_id: Option<Uuid>,
) -> QueryResult<ChatSession> {
    let existing: Option<ChatSession> = chat_sessions::table
        .filter(chat_sessions::session_token.eq(session_token))
        .first(conn)
        .optional()?;
    if let Some(session) = existing {
        return Ok(session);
    }

    let new_session = NewChatSession {
        id: Uuid::new_v4(),
        user_id,
        session_token: session_token.to_string(),
    };
    match diesel::insert_into(chat_sessions::table)
        .values(&new_session)
        .execute(conn)
    {
        Ok(_) => {}
        // Two first messages raced on the same token; use the winner's row.
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => {}
        Err(err) => return Err(err),
    }

    chat_sessions::table
        .filter(chat_sessions::session_token.eq(session_token))
        .first(conn)
}

pub fn append_chat_message(
    conn: &mut PgConnection,
    session: &ChatSession,
    content: &str,
    is_from_user: bool,
) -> QueryResult<ChatMessage> {
    let new_message = NewChatMessage {
        id: Uuid::new_v4(),
        session_id: session.id,
        content: content.to_string(),
        is_from_user,
    };

    diesel::insert_into(chat_messages::table)
        .values(&new_message)
        .execute(conn)?;

    diesel::update(chat_sessions::table.find(session.id))
        .set(chat_sessions::updated_at.eq(Utc::now().naive_utc()))
        .execute(conn)?;

    chat_messages::table.find(new_message.id).first(conn)
}

/// Replays a session's stored messages as conversation history, oldest first.
pub fn load_chat_history(conn: &mut PgConnection, session_id: Uuid) -> QueryResult<Vec<ChatTurn>> {
    let messages: Vec<ChatMessage> = chat_messages::table
        .filter(chat_messages::session_id.eq(session_id))
        .order(chat_messages::created_at.asc())
        .load(conn)?;

    Ok(messages
        .into_iter()
        .map(|message| {
            if message.is_from_user {
                ChatTurn::user(message.content)
            } else {
                ChatTurn::assistant(message.content)
            }
        })
        .collect())
}
