use mbcas_platform::HttpPlatformClient;
use mbcas_reconciler::{Reconciler, ReconcilerConfig};
use mbcas_storage::{AllocationStore, RedbAllocationStore};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match ReconcilerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "fatal config error");
            return ExitCode::from(1);
        }
    };

    let platform = Arc::new(HttpPlatformClient::new(config.platform_url.clone()));
    // A standalone reconciler has no node to probe at startup; list_pods_on_node
    // against a placeholder name is a cheap connectivity check against the
    // same endpoint the agent binary checks with get_node.
    if let Err(e) = platform.list_pods_on_node("__mbcas_connectivity_check__").await {
        error!(error = %e, "platform API unreachable at startup");
        return ExitCode::from(2);
    }

    let store_path = std::env::var("ALLOCATION_STORE_PATH").unwrap_or_else(|_| "./mbcas-allocations.redb".to_string());
    let store: Arc<dyn AllocationStore> = match RedbAllocationStore::new(&store_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "failed to open allocation store");
            return ExitCode::from(1);
        }
    };
    let reconciler = Arc::new(Reconciler::new(config, store, platform));

    let token = CancellationToken::new();
    let run_token = token.clone();
    let handle = tokio::spawn(async move { reconciler.run(run_token).await });

    let sig = shutdown_signal().await;
    info!("received {}, shutting down gracefully", sig);
    token.cancel();

    match tokio::time::timeout(std::time::Duration::from_secs(10), handle).await {
        Ok(Ok(Ok(()))) => ExitCode::SUCCESS,
        Ok(Ok(Err(e))) => {
            error!(error = %e, "reconciler exited with error");
            ExitCode::from(1)
        }
        Ok(Err(e)) => {
            error!(error = %e, "reconciler task panicked");
            ExitCode::from(1)
        }
        Err(_) => {
            error!("reconciler did not shut down within the grace period");
            ExitCode::from(1)
        }
    }
}

async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}
