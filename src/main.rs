use clap::Parser;
use goldgym_cdc::store::PgMembershipStore;
use goldgym_cdc::{start_consumers, BootResources, Config, Result, Shutdown};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "goldgym-cdc")]
#[command(about = "Kafka CDC consumer for the gold-gym membership tables", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting goldgym-cdc");
    info!("Loading configuration from {:?}", args.config);

    let config = match Config::from_file(&args.config) {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    info!(
        kafka_brokers = ?config.kafka.brokers,
        kafka_group_id = %config.kafka.group_id,
        local_to_prod = ?config.kafka.topics.local_to_prod(),
        prod_to_local = ?config.kafka.topics.prod_to_local(),
        local_database = %config.databases.local.database,
        production_database = %config.databases.production.database,
        "Configuration summary"
    );

    let local = PgMembershipStore::connect("local", &config.databases.local).await?;
    let production = PgMembershipStore::connect("production", &config.databases.production).await?;
    let resources = BootResources::new(Arc::new(local), Arc::new(production));

    let shutdown = Shutdown::new();
    let mut consumers = start_consumers(&config.kafka, &resources, &shutdown);

    loop {
        tokio::select! {
            _ = shutdown_signal() => break,
            exit = consumers.next_exit() => match exit {
                Some(exit) if exit.restarting => {
                    warn!(direction = exit.direction.suffix(), attempt = exit.attempt, reason = ?exit.reason, "Consumer exited, supervisor restarting it");
                }
                Some(exit) => {
                    info!(direction = exit.direction.suffix(), reason = ?exit.reason, "Consumer exited");
                }
                None => {
                    warn!("All consumers have stopped");
                    break;
                }
            },
        }
    }

    shutdown.trigger();
    consumers.join().await;

    info!("goldgym-cdc stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("goldgym_cdc=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("goldgym_cdc=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
