use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    ai,
    auth::{policy, AuthenticatedUser},
    error::{AppError, AppResult, FieldError},
    models::{Article, NewArticle},
    schema::articles,
    state::AppState,
};

const MIN_SEARCH_QUERY_LEN: usize = 2;

pub async fn list_articles(State(state): State<AppState>) -> AppResult<Json<Vec<Article>>> {
    let mut conn = state.db()?;
    let items: Vec<Article> = articles::table
        .filter(articles::is_published.eq(true))
        .order(articles::updated_at.desc())
        .load(&mut conn)?;
    Ok(Json(items))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// Keyword search over published articles, title and body. The semantic
/// variant lives under `/api/assist`.
pub async fn search_articles(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<Vec<Article>>> {
    let query = params.q.as_deref().map(str::trim).unwrap_or_default();
    if query.len() < MIN_SEARCH_QUERY_LEN {
        return Err(AppError::bad_request(
            "search query must be at least 2 characters",
        ));
    }

    let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
    let mut conn = state.db()?;
    let items: Vec<Article> = articles::table
        .filter(articles::is_published.eq(true))
        .filter(
            articles::title
                .ilike(pattern.clone())
                .or(articles::content.ilike(pattern)),
        )
        .order(articles::updated_at.desc())
        .load(&mut conn)?;
    Ok(Json(items))
}

pub async fn list_articles_by_category(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
) -> AppResult<Json<Vec<Article>>> {
    let mut conn = state.db()?;
    let items: Vec<Article> = articles::table
        .filter(articles::is_published.eq(true))
        .filter(articles::category_id.eq(category_id))
        .order(articles::updated_at.desc())
        .load(&mut conn)?;
    Ok(Json(items))
}

pub async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Article>> {
    let mut conn = state.db()?;
    let article: Option<Article> = articles::table.find(id).first(&mut conn).optional()?;
    let article = article.ok_or_else(AppError::not_found)?;

    diesel::update(articles::table.find(id))
        .set(articles::view_count.eq(articles::view_count + 1))
        .execute(&mut conn)?;

    Ok(Json(article))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArticleRequest {
    pub title: String,
    pub content: String,
    pub category_id: Option<Uuid>,
    pub is_published: Option<bool>,
}

pub async fn create_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateArticleRequest>,
) -> AppResult<(StatusCode, Json<Article>)> {
    if !policy::can_manage_knowledge_base(user.user()) {
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

    let new_article = NewArticle {
        id: Uuid::new_v4(),
        title: payload.title.trim().to_string(),
        content: payload.content,
        author_id: Some(user.user().id),
        category_id: payload.category_id,
        is_published: payload.is_published.unwrap_or(false),
    };

    let mut conn = state.db()?;
    diesel::insert_into(articles::table)
        .values(&new_article)
        .execute(&mut conn)?;
    let article: Article = articles::table.find(new_article.id).first(&mut conn)?;
    drop(conn);

    refresh_embedding(&state, &article).await;

    Ok((StatusCode::CREATED, Json(article)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateArticleRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category_id: Option<Uuid>,
    pub is_published: Option<bool>,
}

#[derive(AsChangeset)]
#[diesel(table_name = articles)]
struct ArticleChangeset {
    title: Option<String>,
    content: Option<String>,
    category_id: Option<Uuid>,
    is_published: Option<bool>,
    updated_at: chrono::NaiveDateTime,
}

pub async fn update_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateArticleRequest>,
) -> AppResult<Json<Article>> {
    if !policy::can_manage_knowledge_base(user.user()) {
        return Err(AppError::forbidden());
    }

    let mut fields = Vec::new();
    if matches!(payload.title.as_deref(), Some(title) if title.trim().is_empty()) {
        fields.push(FieldError::new("title", "title must not be empty"));
    }
    if matches!(payload.content.as_deref(), Some(content) if content.trim().is_empty()) {
        fields.push(FieldError::new("content", "content must not be empty"));
    }
    if !fields.is_empty() {
        return Err(AppError::validation(fields));
    }

    let mut conn = state.db()?;
    let existing: Option<Article> = articles::table.find(id).first(&mut conn).optional()?;
    let existing = existing.ok_or_else(AppError::not_found)?;

    let text_changed = payload.title.is_some() || payload.content.is_some();
    let changes = ArticleChangeset {
        title: payload.title.map(|title| title.trim().to_string()),
        content: payload.content,
        category_id: payload.category_id,
        is_published: payload.is_published,
        updated_at: Utc::now().naive_utc(),
    };

    diesel::update(articles::table.find(existing.id))
        .set(&changes)
        .execute(&mut conn)?;
    let article: Article = articles::table.find(existing.id).first(&mut conn)?;
    drop(conn);

    if text_changed {
        refresh_embedding(&state, &article).await;
    }

    Ok(Json(article))
}

/// The article write stands even when the embedding refresh fails; search
/// just keeps serving the previous vector (or none) until the next edit.
async fn refresh_embedding(state: &AppState, article: &Article) {
    let text = format!("{}\n\n{}", article.title, article.content);
    if let Err(err) = ai::upsert_article_embedding(state, article.id, &text).await {
        warn!(article_id = %article.id, error = %err, "failed to refresh article embedding");
    }
}
