use challenge_deployer::{
    api::{self, AppState},
    cluster::{ClusterClient, KubeCluster},
    config::DeployerConfig,
    flags::StaticFlags,
    instances::InstanceManager,
    reconciler::Cleaner,
    store::{ChallengeStore, MemoryStore},
    telemetry::{self, Metrics},
};
use kube::Client;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let metrics = Arc::new(Metrics::default());

    info!("Starting challenge deployer");
    let config = Arc::new(DeployerConfig::load()?);
    info!("Configuration loaded");
    if config.jwt_secret.is_empty() {
        warn!("No JWT secret configured, all authenticated routes will reject requests");
    }

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");
    let cluster: Arc<dyn ClusterClient> = Arc::new(KubeCluster::new(client));

    let store: Arc<dyn ChallengeStore> = match config.challenges_file {
        Some(ref path) => {
            info!(path = %path, "Seeding challenges");
            Arc::new(MemoryStore::from_yaml_file(path).await?)
        }
        None => Arc::new(MemoryStore::new()),
    };
    let flags = Arc::new(StaticFlags::new(config.feature_flags.clone()));

    let manager = Arc::new(InstanceManager::new(
        cluster.clone(),
        store,
        flags,
        config.clone(),
        metrics.clone(),
    ));

    let shutdown = CancellationToken::new();
    let cleaner = Cleaner::new(cluster, config.clone(), metrics.clone());
    let cleaner_handle = tokio::spawn(cleaner.run(shutdown.clone()));

    let state = AppState {
        manager,
        metrics,
        jwt_secret: Arc::from(config.jwt_secret.as_str()),
    };
    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Serving API");

    let signal_token = shutdown.clone();
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            info!("Shutdown signal received");
            signal_token.cancel();
        })
        .await?;

    // The server may also stop on its own; make sure the cleaner follows
    shutdown.cancel();
    cleaner_handle.await?;
    info!("Stopped");

    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
