use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tts_core::wav::inspect_reference;
use tts_core::{CommandModel, SharedModel};

use wyoming_server::config::{Cli, ServerConfig};
use wyoming_server::handler::SynthesisContext;
use wyoming_server::metrics;
use wyoming_server::server::{run_until, shutdown_signal, Listener};

/// Recommended length of the voice reference clip, in seconds
const REFERENCE_MIN_SECS: f32 = 10.0;
const REFERENCE_MAX_SECS: f32 = 30.0;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ServerConfig::from_cli(cli)?;
    config.validate()?;

    check_reference(&config);

    info!("Loading model: {}", config.model_command.display());
    let model = CommandModel::new(config.model_command.clone(), config.device.as_str())
        .with_args(&config.model_args);
    info!("Model loaded on {}", config.device);

    let ctx = Arc::new(SynthesisContext::from_config(&config, SharedModel::new(model)));

    if let Some(text) = &config.warmup_text {
        info!("Warming up model...");
        let elapsed = ctx.warm_up(text).await?;
        info!("Warm-up complete in {:.2}s", elapsed.as_secs_f64());
    }

    if let Some(addr) = config.metrics_addr {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind metrics endpoint {addr}: {e}"))?;
        info!("Metrics listening on http://{addr}");
        let app = metrics::router(ctx.metrics.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server failed: {e}");
            }
        });
    }

    let listener = Listener::bind(&config.endpoint)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {e}", config.endpoint))?;
    info!(
        "Server ready at {} (volume boost {}x)",
        listener.local_endpoint()?,
        config.gain
    );

    run_until(listener, ctx, shutdown_signal()).await;
    info!("Server shutdown complete");
    Ok(())
}

/// The reference is only advisory: an unreadable or oddly sized clip is
/// reported but the model gets to decide.
fn check_reference(config: &ServerConfig) {
    match inspect_reference(&config.voice_ref) {
        Ok(reference) => {
            info!(
                "Voice reference: {} ({:.1}s, {} Hz, {} channel(s))",
                config.voice_ref.display(),
                reference.duration_secs,
                reference.sample_rate,
                reference.channels
            );
            if !(REFERENCE_MIN_SECS..=REFERENCE_MAX_SECS).contains(&reference.duration_secs) {
                warn!(
                    "Voice reference is {:.1}s long; 10-30s of clean speech works best",
                    reference.duration_secs
                );
            }
        }
        Err(e) => warn!("{e:#}"),
    }
}
