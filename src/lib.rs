pub mod backend;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod factory;
pub mod handlers;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod relay;
pub mod retry;
pub mod slack;
pub mod visualize;

use axum::{Router, routing::get, routing::post};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use orchestrator::Orchestrator;
use relay::SlackRelay;
use slack::SlackBot;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub relay: Option<SlackRelay>,
    pub slack: Option<SlackBot>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Natural-language answers
        .route("/api/v1/chat", post(handlers::chat::chat))
        // Query language helpers
        .route("/api/v1/translate", get(handlers::query::translate))
        .route("/api/v1/explain", post(handlers::query::explain))
        // Slack Events API
        .route("/api/v1/slack/events", post(handlers::slack::events))
        // Backend catalog
        .route("/api/v1/backends", get(handlers::backends::list_backends))
        // Health
        .route("/healthz", get(handlers::health::healthz))
        .route("/readyz", get(handlers::health::readyz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
