use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use price_sentinel::catalog::{normalize_products, parse_listing, HttpCatalog, ProductCatalog};
use price_sentinel::config::{LoggingConfig, MetricsConfig};
use price_sentinel::models::generate_session_id;
use price_sentinel::monitor::PriceMonitor;
use price_sentinel::plugins::NotifierManager;
use price_sentinel::scheduler::MonitorScheduler;
use price_sentinel::scraper::ChromeLauncher;
use price_sentinel::web::{self, AppState};
use price_sentinel::{AppConfig, Broadcaster, MonitorService, SessionStore};

#[derive(Parser)]
#[command(name = "price-sentinel", version, about = "Competitor price monitor")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API, WebSocket feed and scheduled passes
    Serve,
    /// Run a single monitoring pass and print the outcome as JSON
    Check {
        /// JSON file holding the products to check
        #[arg(long, conflicts_with = "catalog", required_unless_present = "catalog")]
        products: Option<PathBuf>,
        /// Check every product in the configured catalog
        #[arg(long)]
        catalog: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging)?;
    init_metrics(&config.metrics)?;

    info!("Starting Price Sentinel...");

    let service = build_service(&config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, service).await,
        Command::Check { products, catalog } => check(&service, products, catalog).await,
    }
}

/// The returned guard flushes the file log when dropped.
fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "price-sentinel.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}

fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Metrics exporter listening on {}", address);
    Ok(())
}

fn build_service(config: &AppConfig) -> Result<MonitorService> {
    let launcher = ChromeLauncher::new(config.scraper.clone())?;
    let mut monitor = PriceMonitor::new(Arc::new(launcher), config.monitor.clone());

    if let Some(notifier) = NotifierManager::from_config(config)? {
        monitor = monitor.with_notifier(notifier);
    }
    if let Some(catalog) = HttpCatalog::from_config(&config.catalog)? {
        monitor = monitor.with_catalog(Arc::new(catalog));
    }

    Ok(MonitorService::new(
        Arc::new(monitor),
        SessionStore::new(config.monitor.session_retention()),
        Broadcaster::new(),
    ))
}

async fn serve(config: AppConfig, service: MonitorService) -> Result<()> {
    let sweeper = service.store().spawn_sweeper(config.monitor.sweep_interval());

    let mut scheduler = MonitorScheduler::new(service.clone(), config.scheduler.clone()).await?;
    scheduler.start().await?;

    let state = AppState {
        service,
        config: Arc::new(config),
    };
    let result = web::serve(state).await;

    scheduler.shutdown().await?;
    sweeper.abort();
    info!("Shutting down...");
    result
}

async fn check(service: &MonitorService, products: Option<PathBuf>, from_catalog: bool) -> Result<()> {
    let products = if from_catalog {
        let catalog = service
            .monitor()
            .catalog()
            .context("No catalog configured; set catalog.base_url")?;
        catalog.list_products().await?
    } else {
        let path = products.context("Either --products or --catalog is required")?;
        let body = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        normalize_products(parse_listing(&body)?, chrono::Utc::now())
    };

    let session_id = generate_session_id();
    let outcome = service.run_session(&products, &session_id).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "sessionId": session_id,
            "updatedProducts": outcome.updated_products,
            "priceChanges": outcome.price_changes,
        }))?
    );
    Ok(())
}
