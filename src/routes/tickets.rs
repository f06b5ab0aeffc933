use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::{policy, AuthenticatedUser},
    error::{AppError, AppResult, FieldError},
    models::{
        is_valid_priority, is_valid_status, NewTicket, NewTicketFile, Ticket, TicketFile,
        TicketMessage, User, PRIORITY_NORMAL, STATUS_OPEN,
    },
    schema::{ticket_files, ticket_messages, tickets, users},
    state::AppState,
    store,
};

#[derive(Deserialize)]
pub struct ListTicketsQuery {
    pub status: Option<String>,
    pub assignee: Option<String>,
}

/// Agents see every ticket, optionally narrowed by `?status=` or
/// `?assignee=me`; visitors only ever see their own.
pub async fn list_tickets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ListTicketsQuery>,
) -> AppResult<Json<Vec<Ticket>>> {
    let mut conn = state.db()?;
    let mut query = tickets::table
        .order(tickets::updated_at.desc())
        .into_boxed();

    if policy::is_agent(user.user()) {
        if let Some(status) = params.status.as_deref() {
            if !is_valid_status(status) {
                return Err(AppError::bad_request(format!(
                    "invalid status filter: {status}"
                )));
            }
            query = query.filter(tickets::status.eq(status.to_string()));
        }
        if params.assignee.as_deref() == Some("me") {
            query = query.filter(tickets::assignee_id.eq(user.user().id));
        }
    } else {
        query = query.filter(tickets::requester_id.eq(user.user().id));
    }

    let items: Vec<Ticket> = query.load(&mut conn)?;
    Ok(Json(items))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Ticket>> {
    let mut conn = state.db()?;
    let ticket = store::find_ticket(&mut conn, id)?.ok_or_else(AppError::not_found)?;
    if !policy::can_access_ticket(user.user(), &ticket) {
        return Err(AppError::forbidden());
    }
    Ok(Json(ticket))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketRequest {
    pub subject: String,
    pub description: String,
    pub priority: Option<String>,
    pub order_number: Option<String>,
}

/// New tickets open in the requester's name with the description doubling as
/// the first message of the conversation.
pub async fn create_ticket(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateTicketRequest>,
) -> AppResult<(StatusCode, Json<Ticket>)> {
    let mut fields = Vec::new();
    if payload.subject.trim().is_empty() {
        fields.push(FieldError::new("subject", "subject must not be empty"));
    }
    if payload.description.trim().is_empty() {
        fields.push(FieldError::new(
            "description",
            "description must not be empty",
        ));
    }
    if let Some(priority) = payload.priority.as_deref() {
        if !is_valid_priority(priority) {
            fields.push(FieldError::new(
                "priority",
                "priority must be low, normal, or high",
            ));
        }
    }
    if !fields.is_empty() {
        return Err(AppError::validation(fields));
    }

    let new_ticket = NewTicket {
        id: Uuid::new_v4(),
        subject: payload.subject.trim().to_string(),
        description: payload.description.trim().to_string(),
        status: STATUS_OPEN.to_string(),
        priority: payload
            .priority
            .unwrap_or_else(|| PRIORITY_NORMAL.to_string()),
        requester_id: user.user().id,
        order_number: payload.order_number,
    };

    let mut conn = state.db()?;
    diesel::insert_into(tickets::table)
        .values(&new_ticket)
        .execute(&mut conn)?;
    let ticket: Ticket = tickets::table.find(new_ticket.id).first(&mut conn)?;

    store::post_ticket_message(&mut conn, &ticket, user.user(), &ticket.description, false)?;

    Ok((StatusCode::CREATED, Json(ticket)))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub async fn update_ticket_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<Ticket>> {
    if !is_valid_status(&payload.status) {
        return Err(AppError::bad_request(format!(
            "invalid status: {}",
            payload.status
        )));
    }
    if !policy::can_change_ticket_status(user.user()) {
        return Err(AppError::forbidden());
    }

    let mut conn = state.db()?;
    let ticket = store::update_ticket_status(&mut conn, id, &payload.status)?
        .ok_or_else(AppError::not_found)?;
    Ok(Json(ticket))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTicketRequest {
    pub assignee_id: Option<Uuid>,
}

/// Assigns (or unassigns, with a null id) a ticket. The assignee must be an
/// agent; pointing a ticket at a visitor is rejected up front.
pub async fn assign_ticket(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignTicketRequest>,
) -> AppResult<Json<Ticket>> {
    if !policy::can_assign_ticket(user.user()) {
        return Err(AppError::forbidden());
    }

    let mut conn = state.db()?;
    if let Some(assignee_id) = payload.assignee_id {
        let assignee: Option<User> = users::table.find(assignee_id).first(&mut conn).optional()?;
        match assignee {
            Some(assignee) if policy::is_agent(&assignee) => {}
            _ => {
                return Err(AppError::bad_request("assignee must be an agent"));
            }
        }
    }

    let ticket = store::assign_ticket(&mut conn, id, payload.assignee_id)?
        .ok_or_else(AppError::not_found)?;
    Ok(Json(ticket))
}

pub async fn list_ticket_messages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<TicketMessage>>> {
    let mut conn = state.db()?;
    let ticket = store::find_ticket(&mut conn, id)?.ok_or_else(AppError::not_found)?;
    if !policy::can_access_ticket(user.user(), &ticket) {
        return Err(AppError::forbidden());
    }

    let messages: Vec<TicketMessage> = ticket_messages::table
        .filter(ticket_messages::ticket_id.eq(ticket.id))
        .order(ticket_messages::created_at.asc())
        .load(&mut conn)?;
    Ok(Json(messages))
}

#[derive(Deserialize)]
pub struct CreateMessageRequest {
    pub content: String,
}

pub async fn create_ticket_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateMessageRequest>,
) -> AppResult<(StatusCode, Json<TicketMessage>)> {
    if payload.content.trim().is_empty() {
        return Err(AppError::validation(vec![FieldError::new(
            "content",
            "content must not be empty",
        )]));
    }

    let mut conn = state.db()?;
    let ticket = store::find_ticket(&mut conn, id)?.ok_or_else(AppError::not_found)?;
    if !policy::can_access_ticket(user.user(), &ticket) {
        return Err(AppError::forbidden());
    }

    let message =
        store::post_ticket_message(&mut conn, &ticket, user.user(), payload.content.trim(), false)?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_ticket_files(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<TicketFile>>> {
    let mut conn = state.db()?;
    let ticket = store::find_ticket(&mut conn, id)?.ok_or_else(AppError::not_found)?;
    if !policy::can_access_ticket(user.user(), &ticket) {
        return Err(AppError::forbidden());
    }

    let files: Vec<TicketFile> = ticket_files::table
        .filter(ticket_files::ticket_id.eq(ticket.id))
        .order(ticket_files::created_at.desc())
        .load(&mut conn)?;
    Ok(Json(files))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest {
    pub filename: String,
    pub file_url: String,
    pub file_size: i64,
    pub mime_type: String,
}

/// Records attachment metadata; the bytes themselves live with an external
/// upload service and are referenced by URL.
pub async fn create_ticket_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateFileRequest>,
) -> AppResult<(StatusCode, Json<TicketFile>)> {
    let mut fields = Vec::new();
    if payload.filename.trim().is_empty() {
        fields.push(FieldError::new("filename", "filename must not be empty"));
    }
    if payload.file_url.trim().is_empty() {
        fields.push(FieldError::new("fileUrl", "fileUrl must not be empty"));
    }
    if payload.mime_type.trim().is_empty() {
        fields.push(FieldError::new("mimeType", "mimeType must not be empty"));
    }
    if payload.file_size <= 0 {
        fields.push(FieldError::new("fileSize", "fileSize must be positive"));
    }
    if !fields.is_empty() {
        return Err(AppError::validation(fields));
    }

    let mut conn = state.db()?;
    let ticket = store::find_ticket(&mut conn, id)?.ok_or_else(AppError::not_found)?;
    if !policy::can_access_ticket(user.user(), &ticket) {
        return Err(AppError::forbidden());
    }

    let new_file = NewTicketFile {
        id: Uuid::new_v4(),
        ticket_id: ticket.id,
        filename: payload.filename.trim().to_string(),
        file_url: payload.file_url.trim().to_string(),
        file_size: payload.file_size,
        mime_type: payload.mime_type.trim().to_string(),
    };

    diesel::insert_into(ticket_files::table)
        .values(&new_file)
        .execute(&mut conn)?;
    let file: TicketFile = ticket_files::table.find(new_file.id).first(&mut conn)?;

    Ok((StatusCode::CREATED, Json(file)))
}
