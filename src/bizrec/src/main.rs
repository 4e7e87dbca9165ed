//! bizrec: hybrid business recommendations over JSON catalog and
//! interaction-log exports.
//!
//! Each subcommand loads the inputs, builds the recommendation service and
//! prints its result as JSON on stdout. Logs go to stderr.

use anyhow::Context;
use bizrec_core::config::AppConfig;
use bizrec_core::source::{InMemoryCatalog, InMemoryInteractionLog, InteractionLog};
use bizrec_core::types::{PriceRange, UserId, UserPreferences};
use bizrec_recommender::RecommendationService;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "bizrec")]
#[command(about = "Hybrid content/collaborative business recommender")]
#[command(version)]
struct Cli {
    /// Business catalog as a JSON array of rows
    #[arg(long, env = "BIZREC_CATALOG")]
    catalog: PathBuf,

    /// Interaction log as a JSON array of rows
    #[arg(long, env = "BIZREC_INTERACTIONS")]
    interactions: Option<PathBuf>,

    /// Training window in days (overrides config)
    #[arg(long, env = "BIZREC__ENGINE__RETENTION_DAYS")]
    retention_days: Option<i64>,

    /// Neighbours used by collaborative filtering (overrides config)
    #[arg(long, env = "BIZREC__ENGINE__NEIGHBORS")]
    neighbors: Option<usize>,

    /// Expose Prometheus metrics on this port
    #[arg(long, env = "BIZREC_METRICS_PORT")]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one training pass and print its metrics
    Train,
    /// Filter the catalog by explicit preferences
    Preferences {
        #[arg(long = "interest")]
        interests: Vec<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long, value_enum)]
        price_range: Option<PriceArg>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Replay the interaction log and recommend from a user's behaviour
    Behavior {
        #[arg(long)]
        user: Option<UserId>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Train, then blend content and collaborative recommendations
    Hybrid {
        #[arg(long)]
        user: Option<UserId>,
        #[arg(long = "interest")]
        interests: Vec<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Retrain periodically until interrupted
    Schedule {
        /// Seconds between passes (overrides config)
        #[arg(long, env = "BIZREC__TRAINING__SCHEDULE_INTERVAL_SECS")]
        interval_secs: Option<u64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PriceArg {
    Budget,
    Moderate,
    Premium,
}

impl From<PriceArg> for PriceRange {
    fn from(arg: PriceArg) -> Self {
        match arg {
            PriceArg::Budget => PriceRange::Budget,
            PriceArg::Moderate => PriceRange::Moderate,
            PriceArg::Premium => PriceRange::Premium,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bizrec=info,bizrec_recommender=info,bizrec_core=warn".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(days) = cli.retention_days {
        config.engine.retention_days = days;
    }
    if let Some(neighbors) = cli.neighbors {
        config.engine.neighbors = neighbors;
    }
    config.validate()?;

    info!(
        retention_days = config.engine.retention_days,
        neighbors = config.engine.neighbors,
        max_features = config.engine.max_features,
        model_version = %config.training.model_version,
        "Configuration loaded"
    );

    if let Some(port) = cli.metrics_port {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .install()
            .context("failed to start metrics exporter")?;
        info!(port, "Metrics exporter started");
    }

    let catalog = Arc::new(InMemoryCatalog::load(&cli.catalog)?);
    let log = match &cli.interactions {
        Some(path) => Arc::new(InMemoryInteractionLog::load(path)?),
        None => Arc::new(InMemoryInteractionLog::default()),
    };
    info!(
        businesses = catalog.len(),
        interactions = log.len(),
        "Inputs loaded"
    );

    let default_limit = config.engine.default_limit;
    let schedule_interval = config.training.schedule_interval_secs;
    let service = Arc::new(RecommendationService::new(
        config,
        catalog.clone(),
        log.clone(),
    ));

    match cli.command {
        Command::Train => {
            let metrics = service.train()?;
            print_json(&metrics)?;
        }
        Command::Preferences {
            interests,
            location,
            price_range,
            limit,
        } => {
            let preferences = UserPreferences {
                interests,
                location,
                price_range: price_range.map(PriceRange::from),
            };
            let result =
                service.recommend_by_preferences(&preferences, limit.unwrap_or(default_limit))?;
            print_json(&result)?;
        }
        Command::Behavior { user, limit } => {
            let events = log.events_since(DateTime::<Utc>::MIN_UTC)?;
            for event in &events {
                service.tracker().record(event.user_id, &event.business_id, event.action);
            }
            info!(replayed = events.len(), users = service.tracker().len(), "Behaviour replayed");
            let result = service.recommend_by_behavior(user, limit.unwrap_or(default_limit))?;
            print_json(&result)?;
        }
        Command::Hybrid {
            user,
            interests,
            limit,
        } => {
            service.train()?;
            let result = service.recommend_hybrid(user, &interests, limit.unwrap_or(default_limit))?;
            print_json(&result)?;
        }
        Command::Schedule { interval_secs } => {
            let interval_secs = interval_secs.unwrap_or(schedule_interval);
            run_schedule(service, catalog, cli.catalog, interval_secs).await?;
        }
    }

    Ok(())
}

/// Re-read the catalog export, retrain and sweep idle behaviour state on a
/// fixed interval, until Ctrl-C.
async fn run_schedule(
    service: Arc<RecommendationService>,
    catalog: Arc<InMemoryCatalog>,
    catalog_path: PathBuf,
    interval_secs: u64,
) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    info!(interval_secs, "Scheduled retraining started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let worker = service.clone();
                let source = catalog.clone();
                let path = catalog_path.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    if let Err(e) = source.reload(&path) {
                        warn!(error = %e, "Catalog reload failed, training on the previous catalog");
                    }
                    let metrics = worker.train();
                    worker.maintenance();
                    metrics
                })
                .await?;
                match outcome {
                    Ok(metrics) => print_json(&metrics)?,
                    Err(e) => error!(error = %e, "Training pass failed, keeping previous snapshot"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, stopping scheduled retraining");
                break;
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
