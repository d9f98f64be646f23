//! Matchbook service binary
//!
//! Boot sequence for `start`: configuration → logging → metrics exporter →
//! database pool → schema migration → book recovery → ready. The process
//! then hosts the kernel until interrupted; the ingress surface that feeds
//! submissions into [`matching_engine::Exchange`] is embedded by the
//! deployment, not by this binary.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cli::{Cli, Commands};
use config::{generate_default_config, load_config, save_config, validate_config};
use matching_engine::{Exchange, PostgresOrderStore};
use observability::{init_logging, LogFormat};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Start { config } => start(config).await,
        Commands::Validate { config } => validate(config),
        Commands::Init { output } => init(output),
    }
}

async fn start<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let config = load_config(&config_path)?;

    let format: LogFormat = config.logging.format.parse().unwrap_or_default();
    init_logging(&config.service.name, format)?;
    info!(config = ?config_path.as_ref(), "Matchbook starting");

    let report = validate_config(&config);
    for warning in &report.warnings {
        warn!(field = %warning.field, "{}", warning.message);
    }
    if !report.is_valid() {
        for err in &report.errors {
            error!("{}", err);
        }
        anyhow::bail!("cannot start due to configuration errors");
    }

    if config.metrics.enabled {
        observability::init_metrics(config.metrics.port)?;
    }

    let database_url = config
        .database
        .connection_url()
        .context("no database connection configured")?;
    info!(
        "Connecting to database at {}",
        database_url.split('@').next_back().unwrap_or("<unset>")
    );
    let store = PostgresOrderStore::connect(&database_url, config.database.max_connections)
        .await
        .context("failed to connect to database")?;

    // Schema mismatch at boot is fatal; a failed recovery leaves nothing
    // consistent to serve.
    store
        .run_migrations()
        .await
        .context("failed to apply database schema")?;

    let exchange = Arc::new(Exchange::new(Arc::new(store), config.matching.clone()));
    let stats = exchange
        .recover()
        .await
        .context("failed to recover books from durable store")?;
    info!(
        orders = stats.orders,
        instruments = stats.instruments,
        "Recovery complete, kernel ready"
    );
    for symbol in exchange.instruments() {
        let snapshot = exchange.book_snapshot(&symbol, None);
        info!(
            instrument = %symbol,
            best_bid = ?snapshot.best_bid(),
            best_ask = ?snapshot.best_ask(),
            "Recovered book"
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    // Committed durability units are the only source of durable state, so
    // stopping here cannot lose or corrupt anything.
    info!("Shutdown signal received, stopping");

    Ok(())
}

fn validate<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let config = load_config(&config_path)?;
    let report = validate_config(&config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("configuration validation failed");
    }

    println!("[ok] Configuration is valid!");
    println!();
    println!("Service: {} v{}", config.service.name, config.service.version);
    println!("Max connections: {}", config.database.max_connections);
    println!("Unit retries: {}", config.matching.max_unit_retries);
    println!("Snapshot depth: {}", config.matching.snapshot_depth);
    println!(
        "Metrics: {}",
        if config.metrics.enabled {
            format!("enabled on port {}", config.metrics.port)
        } else {
            "disabled".to_string()
        }
    );

    Ok(())
}

fn init<P: AsRef<Path>>(output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();

    let config = generate_default_config();
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {:?}", parent))?;
        }
    }
    save_config(&config, output_path)?;

    println!("[ok] Configuration file created at {:?}", output_path);
    println!();
    println!("Next steps:");
    println!("  1. Edit the file; set the database section for your Postgres");
    println!("     (or export MATCHBOOK_DB_URL / MATCHBOOK_DB_PASSWORD)");
    println!("  2. Run 'matchbook validate --config {:?}'", output_path);
    println!("  3. Run 'matchbook start --config {:?}'", output_path);

    Ok(())
}
