use mbcas_agent::{Agent, AgentConfig, NoPathTracer};
use mbcas_market::NashMarketSolver;
use mbcas_platform::HttpPlatformClient;
use mbcas_sensor::CgroupReader;
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

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "fatal config error");
            return ExitCode::from(1);
        }
    };

    let platform = Arc::new(HttpPlatformClient::new(config.platform_url.clone()));
    if let Err(e) = platform.get_node(&config.node_name).await {
        error!(error = %e, "platform API unreachable at startup");
        return ExitCode::from(2);
    }

    // PodAllocation records are the shared medium between this process and
    // the reconciler; both must point at the same store path.
    let store_path = std::env::var("ALLOCATION_STORE_PATH").unwrap_or_else(|_| "./mbcas-allocations.redb".to_string());
    let store: Arc<dyn AllocationStore> = match RedbAllocationStore::new(&store_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "failed to open allocation store");
            return ExitCode::from(1);
        }
    };
    let sensor = Arc::new(CgroupReader::new("/sys/fs/cgroup"));
    let allocator = Arc::new(NashMarketSolver::new());
    let tracer = Arc::new(NoPathTracer);

    let mut agent = Agent::new(config, platform, store, allocator, sensor, None, tracer);

    let token = CancellationToken::new();
    let run_token = token.clone();
    let handle = tokio::spawn(async move { agent.run(run_token).await });

    let sig = shutdown_signal().await;
    info!("received {}, shutting down gracefully", sig);
    token.cancel();

    match tokio::time::timeout(std::time::Duration::from_secs(10), handle).await {
        Ok(Ok(Ok(()))) => ExitCode::SUCCESS,
        Ok(Ok(Err(e))) => {
            error!(error = %e, "agent exited with error");
            ExitCode::from(1)
        }
        Ok(Err(e)) => {
            error!(error = %e, "agent task panicked");
            ExitCode::from(1)
        }
        Err(_) => {
            error!("agent did not shut down within the grace period");
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
