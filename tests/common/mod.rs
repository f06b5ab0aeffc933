use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use helpdesk::ai::{AiError, AiProvider, ChatTurn};
use helpdesk::config::AppConfig;
use helpdesk::db::{self, PgPool};
use helpdesk::models::NewUser;
use helpdesk::routes;
use helpdesk::state::AppState;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const EMBEDDING_DIM: usize = 32;

/// Deterministic stand-in for the LLM API. Embeddings are bag-of-words
/// vectors hashed into a fixed number of buckets, so texts sharing words
/// score higher than unrelated ones, and semantic-search tests behave
/// predictably. Completions return a configurable canned reply and record
/// the turns they were asked to complete.
#[derive(Default)]
pub struct FakeAi {
    reply: Mutex<Option<String>>,
    requests: Mutex<Vec<Vec<ChatTurn>>>,
}

impl FakeAi {
    pub async fn set_reply(&self, reply: &str) {
        let mut guard = self.reply.lock().await;
        *guard = Some(reply.to_string());
    }

    pub async fn requests(&self) -> Vec<Vec<ChatTurn>> {
        self.requests.lock().await.clone()
    }

    async fn canned_reply(&self) -> String {
        self.reply
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| "Here is what I found in the knowledge base.".to_string())
    }
}

pub fn bag_of_words_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; EMBEDDING_DIM];
    for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        vector[(hash % EMBEDDING_DIM as u64) as usize] += 1.0;
    }
    vector
}

#[async_trait]
impl AiProvider for FakeAi {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        Ok(bag_of_words_embedding(text))
    }

    async fn complete(&self, turns: Vec<ChatTurn>) -> Result<Option<String>, AiError> {
        self.requests.lock().await.push(turns);
        Ok(Some(self.canned_reply().await))
    }

    async fn complete_stream(
        &self,
        turns: Vec<ChatTurn>,
    ) -> Result<mpsc::Receiver<Result<String, AiError>>, AiError> {
        self.requests.lock().await.push(turns);
        let reply = self.canned_reply().await;
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for word in reply.split_inclusive(' ') {
                if tx.send(Ok(word.to_string())).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    ai: Arc<FakeAi>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            openai_api_key: "test-key".to_string(),
            openai_api_base: None,
            chat_model: "test-chat-model".to_string(),
            embedding_model: "test-embedding-model".to_string(),
            cors_allowed_origin: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let ai = Arc::new(FakeAi::default());
        let ai_for_state: Arc<dyn AiProvider> = ai.clone();
        let state = AppState::new(pool.clone(), config, ai_for_state);
        let router = routes::create_router(state.clone());

        Ok(Self { state, router, ai })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    pub fn ai(&self) -> Arc<FakeAi> {
        self.ai.clone()
    }

    /// Inserts a user and returns its id; `auth_id` is what goes into the
    /// `x-auth-user-id` header to act as this user.
    pub async fn insert_user(&self, auth_id: &str, name: &str, role: &str) -> Result<Uuid> {
        let auth_id = auth_id.to_string();
        let name = name.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                email: format!("{auth_id}@example.com"),
                name,
                role,
                external_auth_id: auth_id,
            };
            diesel::insert_into(helpdesk::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn get(&self, path: &str, auth_id: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(auth_id) = auth_id {
            builder = builder.header("x-auth-user-id", auth_id);
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        auth_id: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, auth_id).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        auth_id: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, auth_id).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        auth_id: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(auth_id) = auth_id {
            builder = builder.header("x-auth-user-id", auth_id);
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE ticket_analytics, chat_messages, chat_sessions, ticket_files, \
         ticket_messages, tickets, article_embeddings, articles, macros, categories, users \
         RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
