use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use roomscout::api::{AppState, api_routes};
use roomscout::config::Config;
use roomscout::pipeline::processor::TranscriptProcessor;
use roomscout::pipeline::types::RunOptions;

const USAGE: &str = "\
Usage:
  roomscout run <transcript.txt> [--results]   Process one transcript and print the report
  roomscout serve                              Start the HTTP API";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_env().context("invalid configuration")?;

    match args.first().map(String::as_str) {
        Some("run") => {
            let Some(path) = args.get(1) else {
                eprintln!("{USAGE}");
                std::process::exit(2);
            };
            let options = RunOptions {
                include_results: args.iter().any(|a| a == "--results"),
            };
            run_once(&config, path, options).await
        }
        Some("serve") => serve(&config).await,
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

/// Process a single transcript file and print the JSON report to stdout.
async fn run_once(config: &Config, path: &str, options: RunOptions) -> anyhow::Result<()> {
    let processor = TranscriptProcessor::from_config(config)?;

    // Ctrl-C stops dispatching and still prints what finished.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let report = processor.process_file(path, options, cancel).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let processor = Arc::new(TranscriptProcessor::from_config(config)?);
    let rule_count = processor.safety().rule_count();
    let app = api_routes(AppState::new(processor), config.server.max_upload_bytes);

    eprintln!("🏠 RoomScout v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Classifier: {}", config.classifier.base_url);
    eprintln!("   Threat rules: {rule_count}");
    eprintln!(
        "   Batch size: {} ({} in flight)",
        config.pipeline.batch_size, config.pipeline.max_in_flight
    );
    if let Some(url) = &config.server.listing_store_url {
        eprintln!("   Listing store: {url}");
    }
    eprintln!("   API: http://0.0.0.0:{}/api/transcripts\n", config.server.port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.server.port))?;
    tracing::info!(port = config.server.port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
