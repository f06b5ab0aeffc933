use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::*;

pub const ROLE_VISITOR: &str = "visitor";
pub const ROLE_AGENT: &str = "agent";

pub const STATUS_OPEN: &str = "open";
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_SOLVED: &str = "solved";

pub const PRIORITY_LOW: &str = "low";
pub const PRIORITY_NORMAL: &str = "normal";
pub const PRIORITY_HIGH: &str = "high";

pub fn is_valid_status(status: &str) -> bool {
    matches!(status, STATUS_OPEN | STATUS_PENDING | STATUS_SOLVED)
}

pub fn is_valid_priority(priority: &str) -> bool {
    matches!(priority, PRIORITY_LOW | PRIORITY_NORMAL | PRIORITY_HIGH)
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = users)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub external_auth_id: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub external_auth_id: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = categories)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = categories)]
pub struct NewCategory {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = articles)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub is_published: bool,
    pub view_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = articles)]
pub struct NewArticle {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub is_published: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = article_embeddings)]
#[diesel(belongs_to(Article))]
pub struct ArticleEmbedding {
    pub id: Uuid,
    pub article_id: Uuid,
    pub embedding: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = article_embeddings)]
pub struct NewArticleEmbedding {
    pub id: Uuid,
    pub article_id: Uuid,
    pub embedding: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = tickets)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub subject: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub requester_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub order_number: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tickets)]
pub struct NewTicket {
    pub id: Uuid,
    pub subject: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub requester_id: Uuid,
    pub order_number: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Serialize)]
#[diesel(table_name = ticket_messages)]
#[diesel(belongs_to(Ticket))]
#[serde(rename_all = "camelCase")]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Option<Uuid>,
    pub content: String,
    pub is_from_ai: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ticket_messages)]
pub struct NewTicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Option<Uuid>,
    pub content: String,
    pub is_from_ai: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Serialize)]
#[diesel(table_name = ticket_files)]
#[diesel(belongs_to(Ticket))]
#[serde(rename_all = "camelCase")]
pub struct TicketFile {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub filename: String,
    pub file_url: String,
    pub file_size: i64,
    pub mime_type: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ticket_files)]
pub struct NewTicketFile {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub filename: String,
    pub file_url: String,
    pub file_size: i64,
    pub mime_type: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = chat_sessions)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_token: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_sessions)]
pub struct NewChatSession {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_token: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Serialize)]
#[diesel(table_name = chat_messages)]
#[diesel(belongs_to(ChatSession, foreign_key = session_id))]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub content: String,
    pub is_from_user: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_messages)]
pub struct NewChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub content: String,
    pub is_from_user: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = macros)]
#[serde(rename_all = "camelCase")]
pub struct Macro {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub created_by_id: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = macros)]
pub struct NewMacro {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub created_by_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = ticket_analytics)]
#[serde(rename_all = "camelCase")]
pub struct TicketAnalytics {
    pub id: Uuid,
    pub date: NaiveDate,
    pub ticket_volume: i32,
    pub avg_resolution_minutes: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ticket_analytics)]
pub struct NewTicketAnalytics {
    pub id: Uuid,
    pub date: NaiveDate,
    pub ticket_volume: i32,
    pub avg_resolution_minutes: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_known_statuses() {
        for status in [STATUS_OPEN, STATUS_PENDING, STATUS_SOLVED] {
            assert!(is_valid_status(status));
        }
        assert!(!is_valid_status("closed"));
        assert!(!is_valid_status(""));
    }

    #[test]
    fn recognizes_known_priorities() {
        for priority in [PRIORITY_LOW, PRIORITY_NORMAL, PRIORITY_HIGH] {
            assert!(is_valid_priority(priority));
        }
        assert!(!is_valid_priority("urgent"));
    }
}
