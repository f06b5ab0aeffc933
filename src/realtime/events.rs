//! Wire format for the realtime channel: JSON frames shaped
//! `{"event": "<kebab-case name>", "data": {...}}` in both directions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinTicket { ticket_id: Uuid },
    #[serde(rename_all = "camelCase")]
    LeaveTicket { ticket_id: Uuid },
    #[serde(rename_all = "camelCase")]
    TicketMessage { ticket_id: Uuid, content: String },
    #[serde(rename_all = "camelCase")]
    UpdateTicketStatus { ticket_id: Uuid, status: String },
    #[serde(rename_all = "camelCase")]
    AiMessage { session_id: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorInfo {
    pub id: Uuid,
    pub name: String,
    pub role: String,
}

/// A persisted ticket message enriched with author display info for fan-out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketMessageBroadcast {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Option<Uuid>,
    pub content: String,
    pub is_from_ai: bool,
    pub created_at: NaiveDateTime,
    pub author: Option<AuthorInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    TicketMessage(TicketMessageBroadcast),
    #[serde(rename_all = "camelCase")]
    TicketUpdated { ticket_id: Uuid, status: String },
    #[serde(rename_all = "camelCase")]
    AiMessageChunk {
        content: String,
        done: bool,
        session_id: String,
    },
    #[serde(rename_all = "camelCase")]
    AiMessageReceived { session_id: String },
    Error { message: String },
}
