use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::Serialize;

use crate::{
    auth::{policy, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{STATUS_OPEN, STATUS_PENDING, STATUS_SOLVED},
    schema::{articles, tickets},
    state::AppState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub open_tickets: i64,
    pub pending_tickets: i64,
    pub solved_tickets: i64,
    pub unassigned_tickets: i64,
    pub published_articles: i64,
}

pub async fn stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<DashboardStats>> {
    if !policy::can_view_dashboard(user.user()) {
        return Err(AppError::forbidden());
    }

    let mut conn = state.db()?;
    let open_tickets: i64 = tickets::table
        .filter(tickets::status.eq(STATUS_OPEN))
        .count()
        .get_result(&mut conn)?;
    let pending_tickets: i64 = tickets::table
        .filter(tickets::status.eq(STATUS_PENDING))
        .count()
        .get_result(&mut conn)?;
    let solved_tickets: i64 = tickets::table
        .filter(tickets::status.eq(STATUS_SOLVED))
        .count()
        .get_result(&mut conn)?;
    let unassigned_tickets: i64 = tickets::table
        .filter(tickets::status.ne(STATUS_SOLVED))
        .filter(tickets::assignee_id.is_null())
        .count()
        .get_result(&mut conn)?;
    let published_articles: i64 = articles::table
        .filter(articles::is_published.eq(true))
        .count()
        .get_result(&mut conn)?;

    Ok(Json(DashboardStats {
        open_tickets,
        pending_tickets,
        solved_tickets,
        unassigned_tickets,
        published_articles,
    }))
}
