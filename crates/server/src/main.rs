use anyhow::Result;
use copilot_core::config::{AppConfig, LoadOptions};
use copilot_server::{bootstrap, router};
use tracing::{info, warn};

fn init_logging(config: &AppConfig) {
    use copilot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.server.started",
        bind_address = %address,
        api_base = %app.config.backend.api_base,
        openai_configured = app.config.llm_configured(),
        "copilot-server listening"
    );

    axum::serve(listener, router(app.state.clone()))
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    app.sweeper.shutdown();
    info!(event_name = "system.server.stopping", "copilot-server stopping");

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(
            event_name = "system.server.signal_failed",
            error = %error,
            "unable to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}
