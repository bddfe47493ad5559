// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use futures_util::future::join_all;
use serde_json::{Value, json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use routeros_api::{
    ApiError, ApiMetrics, Client, Config, Observers, Result, SessionObserver, TracingObserver,
};

/// Runs RouterOS API commands and prints the replies as JSON
#[derive(Parser, Debug)]
#[command(name = "routeros-query", version)]
struct Cli {
    /// Router name from ROUTERS_CONFIG; the first router if omitted
    #[arg(short, long, env = "ROUTER")]
    router: Option<String>,

    /// Command words separated by whitespace, e.g. "/interface/print ?type=ether"
    #[arg(short, long = "command", value_name = "WORDS", required = true)]
    commands: Vec<String>,

    /// Print rows in arrival order instead of indexing by id
    #[arg(long)]
    rows: bool,

    /// Print session metrics in OpenMetrics text format afterwards
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    setup_tracing();

    let config = Config::from_env();
    tracing::debug!(
        "Loaded configuration for {} router(s)",
        config.routers.len()
    );

    let router = match &cli.router {
        Some(name) => config.router(name),
        None => config.routers.first(),
    }
    .cloned()
    .ok_or_else(|| {
        ApiError::Config(match &cli.router {
            Some(name) => format!("router '{name}' is not configured"),
            None => "no router configured".to_string(),
        })
    })?;

    let metrics = ApiMetrics::new();
    let mut observers = Observers::new().with(Arc::new(TracingObserver));
    if cli.metrics {
        observers = observers.with(metrics.observer(&router.name));
    }
    let mut options = config.client_options();
    let observer: Arc<dyn SessionObserver> = Arc::new(observers);
    options.session.observer = Some(observer);

    tracing::info!(
        "Connecting to router '{}' at {}:{}",
        router.name,
        router.address,
        router.port
    );
    let client = Client::connect_with(router, options).await?;

    let outputs = tokio::select! {
        outputs = run_commands(&client, &cli.commands, cli.rows) => Some(outputs),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, closing session");
            None
        }
    };
    client.close().await;

    let Some(outputs) = outputs else {
        return Ok(ExitCode::FAILURE);
    };
    let failed = outputs.iter().filter(|o| o.get("error").is_some()).count();
    match serde_json::to_string_pretty(&outputs) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::error!("Failed to serialize results: {}", e),
    }

    if cli.metrics {
        match metrics.encode_metrics().await {
            Ok(text) => print!("{text}"),
            Err(e) => tracing::error!("Failed to encode metrics: {}", e),
        }
    }

    if failed > 0 {
        tracing::warn!("{} of {} command(s) failed", failed, outputs.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Sends every command at once over the shared session
async fn run_commands(client: &Client, commands: &[String], rows: bool) -> Vec<Value> {
    let queries = commands.iter().map(|command| async move {
        let words: Vec<&str> = command.split_whitespace().collect();
        let result = if rows {
            client.query_rows(&words).await.map(|rows| json!(rows))
        } else {
            client.query(&words).await.map(|indexed| json!(indexed))
        };
        match result {
            Ok(value) => json!({ "command": command, "result": value }),
            Err(e) => {
                tracing::debug!("Command '{}' failed: {}", command, e);
                json!({ "command": command, "error": e.to_string() })
            }
        }
    });
    join_all(queries).await
}

fn setup_tracing() {
    // RUST_LOG wins; "warn" keeps stdout free for results by default
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
