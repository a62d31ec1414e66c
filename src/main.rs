//! Real-time transcription endpoint for a pretrained speech model.
//!
//! This is the entry point for the inference container. It loads the configuration,
//! starts listening right away, loads and warms the model in the background, and
//! serves `/ping` and `/invocations` until shutdown.

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use parakeet_endpoint::{
    asr::{RuntimeModelLoader, RuntimeSettings},
    config::Config,
    reliability::{init_tracing, shutdown_signal},
    server::{create_router, Readiness, ServiceContext},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    if let Err(e) = init_tracing(&config.log_level, config.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!(
        model = %config.model_id,
        runtime = %config.runtime_url,
        "Starting inference endpoint"
    );

    let shutdown = CancellationToken::new();
    let ctx = Arc::new(ServiceContext::from_config(&config, shutdown.clone())?);

    // Bind first so the platform sees a listener while the model loads
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    let loader = Arc::new(RuntimeModelLoader::new(RuntimeSettings::from_config(&config)));
    let loading = ctx.clone().spawn_loading(loader, config.warmup);

    let app = create_router(ctx.clone(), config.max_request_bytes);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    // The loader marks the model failed before it cancels the token, so a failed
    // state here means the load ended serving; its task is about to finish.
    if ctx.readiness() == Readiness::Failed {
        let e = match loading.await? {
            Err(e) => anyhow::Error::from(e),
            Ok(()) => anyhow::anyhow!("model failed to load"),
        };
        error!(error = %e, "Exiting after model load failure");
        return Err(e);
    }
    loading.abort();

    info!("Server stopped");
    Ok(())
}
