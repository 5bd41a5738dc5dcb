use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roundtable::api;
use roundtable::config::{Config, ProviderKind};
use roundtable::generation::gateway::{ProviderConfig, ProviderGateway};
use roundtable::generation::scripted::ScriptedGenerator;
use roundtable::generation::SharedResponseGenerator;
use roundtable::orchestrator::Orchestrator;
use roundtable::personas::PersonaRegistry;
use roundtable::session::{SessionEngine, TurnPacing};
use roundtable::store::{SharedConversationStore, SqliteConversationStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roundtable=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(port = config.port, provider = ?config.provider, "starting roundtable");

    let store: SharedConversationStore =
        Arc::new(SqliteConversationStore::connect(&config.database_url).await?);

    let generator: SharedResponseGenerator = match config.provider {
        ProviderKind::Anthropic => Arc::new(ProviderGateway::new(
            ProviderConfig::AnthropicCompatible {
                base_url: config.provider_base_url.clone(),
                api_key_env: config.provider_api_key_env.clone(),
                model: config.model.clone(),
            },
            config.rate_limit_per_minute,
        )),
        ProviderKind::OpenAi => Arc::new(ProviderGateway::new(
            ProviderConfig::OpenAiGeneric {
                base_url: config.provider_base_url.clone(),
                api_key_env: config.provider_api_key_env.clone(),
                model: config.model.clone(),
            },
            config.rate_limit_per_minute,
        )),
        ProviderKind::Scripted => Arc::new(ScriptedGenerator::new()),
    };

    let registry = Arc::new(PersonaRegistry::new());
    let orchestrator = Arc::new(Orchestrator::new(registry, generator));
    let engine = Arc::new(SessionEngine::new(
        store,
        orchestrator,
        TurnPacing::realistic(),
    ));

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any);

    let app = api::router(engine).layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
