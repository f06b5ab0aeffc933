//! Seeds a fresh database with demo users, categories, articles, and macros
//! so the app is usable straight after `diesel migration run`. Article
//! embeddings are computed up front so semantic search works immediately.

use std::sync::Arc;

use anyhow::{Context, Result};
use diesel::prelude::*;
use uuid::Uuid;

use helpdesk::{
    ai::{self, provider::OpenAiProvider, AiProvider},
    config::AppConfig,
    db,
    models::{NewArticle, NewCategory, NewMacro, NewUser, ROLE_AGENT, ROLE_VISITOR},
    schema::{articles, categories, macros, users},
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = AppConfig::from_env()?;
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let provider: Arc<dyn AiProvider> = Arc::new(OpenAiProvider::from_config(&config));
    let state = AppState::new(pool.clone(), config, provider);

    let mut conn = pool.get().context("failed to get database connection")?;

    let existing: i64 = users::table.count().get_result(&mut conn)?;
    if existing > 0 {
        println!("Database already has {existing} users; nothing to do.");
        return Ok(());
    }

    let agent = NewUser {
        id: Uuid::new_v4(),
        email: "agent@example.com".to_string(),
        name: "Demo Agent".to_string(),
        role: ROLE_AGENT.to_string(),
        external_auth_id: "demo-agent".to_string(),
    };
    let visitor = NewUser {
        id: Uuid::new_v4(),
        email: "visitor@example.com".to_string(),
        name: "Demo Visitor".to_string(),
        role: ROLE_VISITOR.to_string(),
        external_auth_id: "demo-visitor".to_string(),
    };
    diesel::insert_into(users::table)
        .values(vec![&agent, &visitor])
        .execute(&mut conn)?;

    let getting_started = NewCategory {
        id: Uuid::new_v4(),
        name: "Getting Started".to_string(),
        description: Some("First steps with the service".to_string()),
        icon: Some("rocket".to_string()),
    };
    let billing = NewCategory {
        id: Uuid::new_v4(),
        name: "Billing".to_string(),
        description: Some("Payments, invoices, and refunds".to_string()),
        icon: Some("credit-card".to_string()),
    };
    diesel::insert_into(categories::table)
        .values(vec![&getting_started, &billing])
        .execute(&mut conn)?;

    let seed_articles = vec![
        NewArticle {
            id: Uuid::new_v4(),
            title: "Creating your account".to_string(),
            content: "Sign up with your email address and confirm it via the link we send you."
                .to_string(),
            author_id: Some(agent.id),
            category_id: Some(getting_started.id),
            is_published: true,
        },
        NewArticle {
            id: Uuid::new_v4(),
            title: "Requesting a refund".to_string(),
            content: "Refunds can be requested within 30 days of purchase from the billing page."
                .to_string(),
            author_id: Some(agent.id),
            category_id: Some(billing.id),
            is_published: true,
        },
    ];
    diesel::insert_into(articles::table)
        .values(&seed_articles)
        .execute(&mut conn)?;

    let seed_macros = vec![
        NewMacro {
            id: Uuid::new_v4(),
            title: "Greeting".to_string(),
            content: "Hi! Thanks for reaching out. I'm taking a look at your request now."
                .to_string(),
            created_by_id: agent.id,
        },
        NewMacro {
            id: Uuid::new_v4(),
            title: "Closing".to_string(),
            content: "Glad I could help! I'm marking this ticket as solved; reply any time to reopen it."
                .to_string(),
            created_by_id: agent.id,
        },
    ];
    diesel::insert_into(macros::table)
        .values(&seed_macros)
        .execute(&mut conn)?;
    drop(conn);

    // A failed embedding leaves the article seeded but unsearchable until
    // its next edit, same as the API path.
    for article in &seed_articles {
        let text = format!("{}\n\n{}", article.title, article.content);
        if let Err(err) = ai::upsert_article_embedding(&state, article.id, &text).await {
            eprintln!("Failed to embed article {:?}: {err}", article.title);
        }
    }

    println!(
        "Seeded 2 users, 2 categories, {} articles, {} macros.",
        seed_articles.len(),
        seed_macros.len()
    );
    Ok(())
}
