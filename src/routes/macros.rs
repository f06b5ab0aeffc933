use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::{policy, AuthenticatedUser},
    error::{AppError, AppResult, FieldError},
    models::{Macro, NewMacro},
    schema::macros,
    state::AppState,
};

pub async fn list_macros(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<Macro>>> {
    if !policy::can_use_macros(user.user()) {
        return Err(AppError::forbidden());
    }
    let mut conn = state.db()?;
    let items: Vec<Macro> = macros::table.order(macros::title.asc()).load(&mut conn)?;
    Ok(Json(items))
}

pub async fn get_macro(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Macro>> {
    if !policy::can_use_macros(user.user()) {
        return Err(AppError::forbidden());
    }
    let mut conn = state.db()?;
    let item: Option<Macro> = macros::table.find(id).first(&mut conn).optional()?;
    item.map(Json).ok_or_else(AppError::not_found)
}

#[derive(Deserialize)]
pub struct CreateMacroRequest {
    pub title: String,
    pub content: String,
}

pub async fn create_macro(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateMacroRequest>,
) -> AppResult<(StatusCode, Json<Macro>)> {
    if !policy::can_use_macros(user.user()) {
        return Err(AppError::forbidden());
    }

    let mut fields = Vec::new();
    if payload.title.trim().is_empty() {
        fields.push(FieldError::new("title", "title must not be empty"));
    }
    if payload.content.trim().is_empty() {
        fields.push(FieldError::new("content", "content must not be empty"));
    }
    if !fields.is_empty() {
        return Err(AppError::validation(fields));
    }

    let new_macro = NewMacro {
        id: Uuid::new_v4(),
        title: payload.title.trim().to_string(),
        content: payload.content,
        created_by_id: user.user().id,
    };

    let mut conn = state.db()?;
    diesel::insert_into(macros::table)
        .values(&new_macro)
        .execute(&mut conn)?;
    let created: Macro = macros::table.find(new_macro.id).first(&mut conn)?;

    Ok((StatusCode::CREATED, Json(created)))
}
