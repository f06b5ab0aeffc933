//! Semantic search over knowledge-base articles and the AI assistant built
//! on top of it: embedding upserts, exhaustive cosine ranking, and
//! context-grounded chat completion (single-shot and streamed).

pub mod provider;

use std::cmp::Ordering;

use diesel::prelude::*;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::models::{Article, NewArticleEmbedding};
use crate::schema::{article_embeddings, articles};
use crate::state::AppState;

pub use provider::{AiProvider, ChatRole, ChatTurn};

pub const DEFAULT_SEARCH_LIMIT: usize = 3;

const SYSTEM_PROMPT: &str = "You are a helpful support assistant for this service's help center. \
Your goal is to provide clear, accurate information about the service based on the knowledge base \
articles provided in the context. If you don't know the answer, acknowledge that and suggest the \
visitor submit a support ticket for more personalized assistance. Be friendly, concise, and \
informative in your responses.";

/// Returned when the API answers but produces no content.
pub const FALLBACK_REPLY: &str = "I'm sorry, I couldn't generate a response.";

/// Returned instead of any raw error from retrieval or generation.
pub const APOLOGY_REPLY: &str = "I apologize, but I'm having trouble processing your request. \
Please try again later or submit a support ticket for assistance.";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("embedding request failed: {0}")]
    Embedding(String),
    #[error("completion request failed: {0}")]
    Completion(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("stored embedding is not a float vector: {0}")]
    InvalidEmbedding(String),
}

#[derive(Debug, Clone)]
pub struct ScoredArticle {
    pub article: Article,
    pub similarity: f32,
}

/// One fragment of a streamed assistant reply. The terminal chunk has
/// `done = true`: empty content on normal completion, an apology on failure.
#[derive(Debug, Clone)]
pub struct ChatChunk {
    pub content: String,
    pub done: bool,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b)
}

/// Computes and stores the embedding for an article's current text. The
/// unique constraint on `article_id` makes this a true upsert: concurrent
/// edits cannot leave two live embeddings for one article.
pub async fn upsert_article_embedding(
    state: &AppState,
    article_id: Uuid,
    text: &str,
) -> Result<(), AiError> {
    let vector = state.ai.embed(text).await?;

    let row = NewArticleEmbedding {
        id: Uuid::new_v4(),
        article_id,
        embedding: serde_json::json!(vector),
    };

    let mut conn = state
        .pool
        .get()
        .map_err(|err| AiError::Pool(err.to_string()))?;
    diesel::insert_into(article_embeddings::table)
        .values(&row)
        .on_conflict(article_embeddings::article_id)
        .do_update()
        .set((
            article_embeddings::embedding.eq(&row.embedding),
            article_embeddings::created_at.eq(diesel::dsl::now),
        ))
        .execute(&mut conn)?;

    Ok(())
}

/// Embeds the query and ranks every published article's stored embedding by
/// cosine similarity. O(N) scan by design; fine at knowledge-base scale.
/// Ties keep their load order (stable sort).
pub async fn find_relevant_articles(
    state: &AppState,
    query: &str,
    limit: usize,
) -> Result<Vec<ScoredArticle>, AiError> {
    let query_vector = state.ai.embed(query).await?;

    let mut conn = state
        .pool
        .get()
        .map_err(|err| AiError::Pool(err.to_string()))?;
    let rows: Vec<(crate::models::ArticleEmbedding, Article)> = article_embeddings::table
        .inner_join(articles::table)
        .filter(articles::is_published.eq(true))
        .load(&mut conn)?;
    drop(conn);

    let mut scored = Vec::with_capacity(rows.len());
    for (stored, article) in rows {
        let vector: Vec<f32> = serde_json::from_value(stored.embedding)
            .map_err(|err| AiError::InvalidEmbedding(err.to_string()))?;
        scored.push(ScoredArticle {
            similarity: cosine_similarity(&query_vector, &vector),
            article,
        });
    }

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    scored.truncate(limit);
    Ok(scored)
}

fn context_block(relevant: &[ScoredArticle]) -> String {
    relevant
        .iter()
        .map(|scored| format!("Article: {}\n{}", scored.article.title, scored.article.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_turns(relevant: &[ScoredArticle], history: Vec<ChatTurn>, query: &str) -> Vec<ChatTurn> {
    let context = context_block(relevant);
    let mut turns = Vec::with_capacity(history.len() + 3);
    if !context.is_empty() {
        turns.push(ChatTurn::system(format!(
            "Here are some relevant knowledge base articles that may help with the query:\n\n{context}"
        )));
    }
    turns.push(ChatTurn::system(SYSTEM_PROMPT));
    turns.extend(history);
    turns.push(ChatTurn::user(query));
    turns
}

/// Answers a query grounded in the knowledge base. Never fails: retrieval or
/// generation errors collapse to a user-facing apology.
pub async fn chat_completion(state: &AppState, history: Vec<ChatTurn>, query: &str) -> String {
    match try_chat_completion(state, history, query).await {
        Ok(Some(reply)) => reply,
        Ok(None) => FALLBACK_REPLY.to_string(),
        Err(err) => {
            warn!(error = %err, "chat completion failed");
            APOLOGY_REPLY.to_string()
        }
    }
}

async fn try_chat_completion(
    state: &AppState,
    history: Vec<ChatTurn>,
    query: &str,
) -> Result<Option<String>, AiError> {
    let relevant = find_relevant_articles(state, query, DEFAULT_SEARCH_LIMIT).await?;
    let turns = build_turns(&relevant, history, query);
    state.ai.complete(turns).await
}

/// Streamed variant of [`chat_completion`]: the caller pulls [`ChatChunk`]s
/// until one arrives with `done = true`. Dropping the receiver stops
/// further delivery; there is no explicit cancel.
pub fn stream_chat_response(
    state: AppState,
    history: Vec<ChatTurn>,
    query: String,
) -> mpsc::Receiver<ChatChunk> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let fragments = async {
            let relevant = find_relevant_articles(&state, &query, DEFAULT_SEARCH_LIMIT).await?;
            let turns = build_turns(&relevant, history, &query);
            state.ai.complete_stream(turns).await
        }
        .await;

        let mut fragments = match fragments {
            Ok(fragments) => fragments,
            Err(err) => {
                warn!(error = %err, "failed to start streamed chat response");
                let _ = tx
                    .send(ChatChunk {
                        content: APOLOGY_REPLY.to_string(),
                        done: true,
                    })
                    .await;
                return;
            }
        };

        while let Some(item) = fragments.recv().await {
            match item {
                Ok(delta) => {
                    let chunk = ChatChunk {
                        content: delta,
                        done: false,
                    };
                    if tx.send(chunk).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "streamed chat response failed mid-stream");
                    let _ = tx
                        .send(ChatChunk {
                            content: APOLOGY_REPLY.to_string(),
                            done: true,
                        })
                        .await;
                    return;
                }
            }
        }

        let _ = tx
            .send(ChatChunk {
                content: String::new(),
                done: true,
            })
            .await;
    });

    rx
}
