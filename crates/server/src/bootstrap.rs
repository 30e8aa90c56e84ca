use std::sync::Arc;
use std::time::Duration;

use copilot_agent::{
    backend::{Backend, HttpBackend},
    identity::IdentityResolver,
    llm::OpenAiResponsesRuntime,
    memory::{ConversationStore, InMemoryConversationStore, SessionSweeper},
    tools::ToolRegistry,
    ConversationOrchestrator, RuntimeError,
};
use copilot_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tracing::info;

use crate::app::AppState;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
    pub store: Arc<dyn ConversationStore>,
    pub sweeper: SessionSweeper,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("backend http client setup failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("agent runtime setup failed: {0}")]
    Runtime(#[source] RuntimeError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Must run inside a tokio runtime; the session sweeper is spawned here.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        api_base = %config.backend.api_base,
        openai_configured = config.llm_configured(),
        "starting application bootstrap"
    );

    let backend: Arc<dyn Backend> =
        Arc::new(HttpBackend::new(&config.backend).map_err(BootstrapError::HttpClient)?);
    let store: Arc<dyn ConversationStore> =
        Arc::new(InMemoryConversationStore::from_millis(config.agent.memory_ttl_ms));
    let sweeper = SessionSweeper::spawn(
        &store,
        Duration::from_millis(config.agent.memory_ttl_ms.max(1)),
    );

    let orchestrator = if config.llm_configured() {
        let runtime = OpenAiResponsesRuntime::new(&config.llm).map_err(BootstrapError::Runtime)?;
        let tools = Arc::new(ToolRegistry::maintenance(
            backend.clone(),
            config.agent.max_tool_results,
        ));
        info!(
            event_name = "system.bootstrap.agent_ready",
            model = %config.llm.model,
            tools = tools.len(),
            "agent runtime configured"
        );
        Some(Arc::new(ConversationOrchestrator::new(
            Arc::new(runtime),
            store.clone(),
            tools,
            config.llm.model.clone(),
        )))
    } else {
        info!(
            event_name = "system.bootstrap.offline",
            "no OpenAI API key configured; chat answers in offline mode"
        );
        None
    };

    let state = AppState {
        default_agent_id: config.agent.default_agent_id.clone(),
        identity: Arc::new(IdentityResolver::new(backend)),
        orchestrator,
    };

    Ok(Application { config, state, store, sweeper })
}
