use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sherlog_api::AppState;
use sherlog_api::config::SherlogConfig;
use sherlog_api::factory;
use sherlog_api::llm::OpenAiCompatibleClient;
use sherlog_api::orchestrator::Orchestrator;
use sherlog_api::relay::SlackRelay;
use sherlog_api::slack::SlackBot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("sherlog_api=debug,tower_http=debug")
        }))
        .init();

    let config_path =
        std::env::var("SHERLOG_CONFIG").unwrap_or_else(|_| "./sherlog.toml".to_string());
    let mut config = SherlogConfig::load(&config_path)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());

    // The LLM client is built once and shared by every query engine.
    let llm = Arc::new(OpenAiCompatibleClient::new(&config.llm)?);
    tracing::info!("llm provider {} using model {}", config.llm.provider, config.llm.model);

    let stack = factory::create_backend(&config.backend.backend_type, llm, &config)?;
    let orchestrator = Arc::new(Orchestrator::new(stack));

    let relay = match &config.slack.webhook_url {
        Some(url) if !url.is_empty() => {
            tracing::info!("slack relay enabled");
            Some(SlackRelay::new(url.clone())?)
        }
        _ => None,
    };

    let slack = match (&config.slack.signing_secret, &config.slack.bot_token) {
        (Some(secret), Some(token)) if !secret.is_empty() && !token.is_empty() => {
            tracing::info!("slack events enabled");
            Some(SlackBot::new(secret.clone(), token.clone(), config.slack.api_base_url.clone())?)
        }
        _ => None,
    };

    let state = AppState {
        orchestrator,
        relay,
        slack,
    };
    let app = sherlog_api::router(state);

    let addr: SocketAddr = config.server.listen_addr.parse()?;
    tracing::info!("sherlog-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
