//! Call guidance server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use call_assist_agent::{ModelClassifier, SegmentModel};
use call_assist_config::{load_settings, JourneyCatalog, Settings};
use call_assist_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("CALL_ASSIST_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        }
    };

    init_tracing(&config);

    tracing::info!("Starting call guidance server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config_env = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match init_metrics() {
            Ok(_) => tracing::info!("Initialized Prometheus metrics at /metrics"),
            Err(e) => tracing::warn!(error = %e, "Metrics disabled"),
        }
    }

    let catalog = JourneyCatalog::load(config.journeys_path.as_deref())?;
    tracing::info!(
        source = config.journeys_path.as_deref().unwrap_or("built-in"),
        "Loaded segment journeys"
    );

    let model = init_tier2(&config).await;
    let state = AppState::new(config.clone(), catalog, model);
    tracing::info!(
        tier2_enabled = state.tier2_enabled,
        max_sessions = config.server.max_sessions,
        "Initialized application state"
    );

    let cleanup = state.registry.start_cleanup_task();

    let app = create_router(state);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = cleanup.send(true);
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Tier 2 model, or `None` to run pattern matching only
async fn init_tier2(config: &Settings) -> Option<Arc<dyn SegmentModel>> {
    if !config.classifier.use_tier2 {
        tracing::info!("Tier 2 disabled, using pattern classification only");
        return None;
    }

    match call_assist_llm::create_backend(&config.llm) {
        Ok(backend) => {
            // Unreachable at startup is not fatal; failed calls fall back to Tier 1
            if !backend.is_available().await {
                tracing::warn!(
                    provider = %config.llm.provider,
                    "Tier 2 backend not reachable yet"
                );
            }
            tracing::info!(
                provider = %config.llm.provider,
                model = %config.llm.model,
                "Tier 2 backend initialized"
            );
            let timeout = Duration::from_millis(config.classifier.tier2_timeout_ms);
            Some(Arc::new(ModelClassifier::new(backend, timeout)))
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Tier 2 backend, using pattern classification only"
            );
            None
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!(
            "call_assist={level},call_assist_server={level},call_assist_agent={level},call_assist_llm={level},tower_http=debug"
        )
        .into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    subscriber.with(fmt_layer).init();
}
