use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use confluence_alerts::config::{Config, LoggingConfig};
use confluence_alerts::dispatch::{
    Destination, DestinationBook, DispatchRouter, Dispatcher, WebhookNotifier,
};
use confluence_alerts::engine::AlertEngine;
use confluence_alerts::render::RenderOptions;
use confluence_alerts::server::{build_router, AppContext};
use confluence_alerts::state_store::TimeframeStateStore;
use confluence_alerts::storage::SqliteStore;
use confluence_alerts::toggle_store::AlertToggleStore;

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::try_new(&logging.level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .json();

    match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.with_writer(Arc::new(file)).init();
        }
        None => builder.with_writer(std::io::stdout).init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested, queued dispatches may be abandoned");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set CA_CONFIG_PATH or provide config/default.toml");
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging)?;

    let bind = config.bind_addr()?;
    tracing::info!(
        bind = %bind,
        sqlite = %config.storage.sqlite_path.display(),
        timezone = %config.filter.timezone,
        dev_mode = config.filter.dev_mode,
        test_mode = config.filter.test_mode,
        "Starting confluence-alerts"
    );

    let store = Arc::new(
        SqliteStore::open(&config.storage.sqlite_path).context("failed to open state database")?,
    );
    let states = Arc::new(TimeframeStateStore::new(store.clone()));
    states.bootstrap().context("failed to rehydrate state from history")?;

    let toggles = AlertToggleStore::new(Arc::clone(&store));

    let book = Arc::new(
        DestinationBook::load_from_path(&config.storage.destinations_path)
            .context("failed to load destination book")?,
    );
    if let Some(url) = &config.dispatch.default_webhook_url {
        if book.seed_default(url).context("invalid DISCORD_WEBHOOK_URL")? {
            tracing::info!("Seeded default destination from environment");
        }
    }
    if book.resolve("default").is_none() {
        tracing::warn!("No default destination configured; unmapped symbols will be dropped");
    }

    let timeout = Duration::from_millis(config.dispatch.timeout_ms);
    let notifier = Arc::new(WebhookNotifier::new(timeout)?);
    let dispatcher = Arc::new(Dispatcher::new(
        notifier,
        timeout,
        config.dispatch.queue_depth,
    ));

    let alt_destination = match (&config.alt_channel.webhook_url, config.alt_channel.enabled) {
        (Some(url), true) => Some(Destination {
            key: "alt".to_string(),
            url: url.clone(),
        }),
        (None, true) => {
            tracing::warn!("Alt channel enabled but ALT_CHANNEL_WEBHOOK_URL is unset");
            None
        }
        _ => None,
    };

    let engine = AlertEngine::new(
        states,
        Arc::new(toggles.clone()),
        DispatchRouter::new(Arc::clone(&book)),
        dispatcher,
        config.filter.clone(),
        RenderOptions {
            timezone: config.filter.timezone,
            mention: config.dispatch.mention.clone(),
        },
    )
    .with_alt_destination(alt_destination);

    let ctx = Arc::new(AppContext {
        engine: Arc::new(engine),
        toggles,
        destinations: book,
    });

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    tracing::info!(bind = %bind, "Listening");
    axum::serve(listener, build_router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Stopped");
    Ok(())
}
