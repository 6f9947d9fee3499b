//! hashgate-server: process entry point.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use hashgate::{Argon2Task, HashService, transport::serve};

use crate::config::Config;

/// Initialize tracing with HASHGATE_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("HASHGATE_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };

        EnvFilter::new(format!(
            "hashgate={level},hashgate_server={level}",
            level = base_level
        ))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("hashgate {}", hashgate::HASHGATE_VERSION);

    let config = Config::from_env().context("failed to read configuration")?;

    let task = Argon2Task::new(config.hash).context("invalid hash parameters")?;
    info!(
        max_concurrent_operations = config.max_concurrent_operations,
        memory_kib = config.hash.memory_kib,
        iterations = config.hash.iterations,
        parallelism = config.hash.parallelism,
        memory_budget_mib = config.memory_budget_bytes() / (1024 * 1024),
        "Hashing limits configured"
    );

    let service = HashService::new(task, config.max_concurrent_operations)
        .context("failed to start hashing service")?;

    serve(config.server, Arc::new(service)).await
}
