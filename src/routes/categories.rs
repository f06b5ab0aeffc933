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
    models::{Category, NewCategory},
    schema::categories,
    state::AppState,
};

pub async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    let mut conn = state.db()?;
    let items: Vec<Category> = categories::table
        .order(categories::name.asc())
        .load(&mut conn)?;
    Ok(Json(items))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Category>> {
    let mut conn = state.db()?;
    let category: Option<Category> = categories::table.find(id).first(&mut conn).optional()?;
    category.map(Json).ok_or_else(AppError::not_found)
}

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
}

pub async fn create_category(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCategoryRequest>,
) -> AppResult<(StatusCode, Json<Category>)> {
    if !policy::can_manage_knowledge_base(user.user()) {
        return Err(AppError::forbidden());
    }
    if payload.name.trim().is_empty() {
        return Err(AppError::validation(vec![FieldError::new(
            "name",
            "name must not be empty",
        )]));
    }

    let new_category = NewCategory {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        description: payload.description,
        icon: payload.icon,
    };

    let mut conn = state.db()?;
    diesel::insert_into(categories::table)
        .values(&new_category)
        .execute(&mut conn)?;
    let category: Category = categories::table.find(new_category.id).first(&mut conn)?;

    Ok((StatusCode::CREATED, Json(category)))
}

#[derive(Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = categories)]
struct CategoryChangeset {
    name: Option<String>,
    description: Option<String>,
    icon: Option<String>,
}

pub async fn update_category(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCategoryRequest>,
) -> AppResult<Json<Category>> {
    if !policy::can_manage_knowledge_base(user.user()) {
        return Err(AppError::forbidden());
    }
    if let Some(name) = payload.name.as_deref() {
        if name.trim().is_empty() {
            return Err(AppError::validation(vec![FieldError::new(
                "name",
                "name must not be empty",
            )]));
        }
    }

    let mut conn = state.db()?;
    let existing: Option<Category> = categories::table.find(id).first(&mut conn).optional()?;
    let existing = existing.ok_or_else(AppError::not_found)?;

    let changes = CategoryChangeset {
        name: payload.name.map(|name| name.trim().to_string()),
        description: payload.description,
        icon: payload.icon,
    };
    if changes.name.is_none() && changes.description.is_none() && changes.icon.is_none() {
        return Ok(Json(existing));
    }

    diesel::update(categories::table.find(id))
        .set(&changes)
        .execute(&mut conn)?;
    let category: Category = categories::table.find(id).first(&mut conn)?;
    Ok(Json(category))
}
