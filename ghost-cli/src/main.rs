use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ghost_cache::{
    CacheStorage, FileStorage, HttpNetwork, MemoryStorage, Network, OfflineProxy, ProxyHost,
};
use ghost_cli::{AppConfig, AppError, CliArgs, ProxyServer, StorageKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) -> Result<(), AppError> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ghost={default_level},ghost_cli={default_level},ghost_cache={default_level},hyper=warn,reqwest=warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .try_init()
        .map_err(|e| AppError::Initialization(e.to_string()))
}

/// Retry a failed install until it succeeds; the host keeps serving meanwhile
fn spawn_install_retry(
    host: Arc<ProxyHost>,
    proxy: Arc<OfflineProxy>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match host.deploy(proxy.clone()).await {
                Ok(state) => {
                    info!(generation = proxy.generation(), state = %state, "Install retry succeeded");
                    break;
                }
                Err(e) => warn!(generation = proxy.generation(), error = %e, "Install retry failed"),
            }
        }
    })
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();
    init_logging(args.verbose)?;

    let config = AppConfig::load(args.config.as_deref())?.merge_args(&args);
    info!(
        generation = %config.proxy.generation,
        origin = %config.proxy.scope,
        assets = ?config.proxy.assets,
        "Starting ghost"
    );

    let storage: Arc<dyn CacheStorage> = match config.storage.kind {
        StorageKind::Memory => {
            info!("Using in-memory cache storage");
            Arc::new(MemoryStorage::new())
        }
        StorageKind::File => {
            let dir = config.storage.resolved_dir();
            info!(dir = %dir.display(), "Using file cache storage");
            Arc::new(FileStorage::new(dir).await?)
        }
    };

    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(&config.network)?);
    let proxy = Arc::new(OfflineProxy::new(
        config.proxy.clone(),
        storage.clone(),
        network.clone(),
    )?);
    let host = Arc::new(ProxyHost::with_storage(network, storage));

    if let Err(e) = host.deploy(proxy.clone()).await {
        warn!(error = %e, "Install failed, serving stored buckets until it succeeds");
        if let Some(interval) = config.install_retry() {
            spawn_install_retry(host.clone(), proxy.clone(), interval);
        }
    }

    let server =
        ProxyServer::start(config.listen_addr()?, host.clone(), proxy.scope().clone()).await?;
    info!(url = %server.url(), "Serving");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    server.shutdown().await;

    Ok(())
}
