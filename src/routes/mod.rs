use axum::http::HeaderValue;
use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{realtime, state::AppState};

pub mod articles;
pub mod assist;
pub mod categories;
pub mod dashboard;
pub mod health;
pub mod macros;
pub mod tickets;
pub mod users;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let categories_routes = Router::new()
        .route(
            "/",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/:id",
            get(categories::get_category).patch(categories::update_category),
        );

    let articles_routes = Router::new()
        .route(
            "/",
            get(articles::list_articles).post(articles::create_article),
        )
        .route("/search", get(articles::search_articles))
        .route(
            "/category/:category_id",
            get(articles::list_articles_by_category),
        )
        .route(
            "/:id",
            get(articles::get_article).patch(articles::update_article),
        );

    let tickets_routes = Router::new()
        .route("/", get(tickets::list_tickets).post(tickets::create_ticket))
        .route("/:id", get(tickets::get_ticket))
        .route("/:id/status", patch(tickets::update_ticket_status))
        .route("/:id/assign", patch(tickets::assign_ticket))
        .route(
            "/:id/messages",
            get(tickets::list_ticket_messages).post(tickets::create_ticket_message),
        )
        .route(
            "/:id/files",
            get(tickets::list_ticket_files).post(tickets::create_ticket_file),
        );

    let macros_routes = Router::new()
        .route("/", get(macros::list_macros).post(macros::create_macro))
        .route("/:id", get(macros::get_macro));

    Router::new()
        .nest("/api/categories", categories_routes)
        .nest("/api/articles", articles_routes)
        .nest("/api/tickets", tickets_routes)
        .nest("/api/macros", macros_routes)
        .route("/api/dashboard/stats", get(dashboard::stats))
        .route("/api/assist", post(assist::assist))
        .route("/api/assist/stream", get(assist::assist_stream))
        .route("/api/user", get(users::current_user))
        .route("/api/health", get(health::health_check))
        .route("/ws", get(realtime::ws_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
