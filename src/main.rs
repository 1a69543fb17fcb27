use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use legal_council::handlers::{
    archive_session_handler, cancel_stream_handler, case_statistics_handler,
    create_session_handler, generate_opinion_handler, get_case_handler, get_messages_handler,
    get_session_handler, health_check, list_sessions_handler, message_stream_handler,
    search_cases_handler,
};
use legal_council::init::app_init;
use legal_council::AppState;

fn create_app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/v1/sessions",
            post(create_session_handler).get(list_sessions_handler),
        )
        .route(
            "/api/v1/sessions/{id}",
            get(get_session_handler).delete(archive_session_handler),
        )
        .route("/api/v1/sessions/{id}/messages", get(get_messages_handler))
        .route("/api/v1/sessions/{id}/opinion", post(generate_opinion_handler))
        .route(
            "/api/v1/sessions/{id}/messages/stream",
            post(message_stream_handler),
        )
        .route("/api/v1/streams/{request_id}", delete(cancel_stream_handler))
        .route("/api/v1/cases/search", post(search_cases_handler))
        .route("/api/v1/cases/statistics", get(case_statistics_handler))
        .route("/api/v1/cases/{id}", get(get_case_handler))
        .route("/health", get(health_check))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("🚀 Starting Legal Council deliberation server...");
    let (config, state) = app_init().await?;
    log::info!("✅ Application state initialized");
    let app = create_app_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("");
    log::info!("🎉 Server started!");
    log::info!("📍 http://{}", addr);
    log::info!("⚖️  Sessions: http://{}/api/v1/sessions", addr);
    log::info!("🔎 Cases: http://{}/api/v1/cases/search", addr);
    log::info!("❤️  Health: http://{}/health", addr);
    log::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
