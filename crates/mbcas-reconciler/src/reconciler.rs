use crate::backoff::backoff_duration;
use crate::config::ReconcilerConfig;
use crate::decide::{decide, ReconcileAction};
use crate::ordering::{order_for_node, PendingItem};
use mbcas_core::quantities::parse_millicores;
use mbcas_core::{MbcasError, Phase, PodAllocation};
use mbcas_platform::PlatformClient;
use mbcas_storage::AllocationStore;
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Cluster-level control loop: watches `Pending` PodAllocation records and
/// drives the platform's in-place resize subresource.
pub struct Reconciler {
    config: ReconcilerConfig,
    store: Arc<dyn AllocationStore>,
    platform: Arc<dyn PlatformClient>,
    key_locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig, store: Arc<dyn AllocationStore>, platform: Arc<dyn PlatformClient>) -> Self {
        Self {
            config,
            store,
            platform,
            key_locks: SyncMutex::new(HashMap::new()),
        }
    }

    pub async fn run(self: Arc<Self>, token: CancellationToken) -> mbcas_core::Result<()> {
        let (tx, rx) = mpsc::channel::<String>(self.config.queue_capacity);
        let rx = Arc::new(AsyncMutex::new(rx));

        let mut workers = Vec::with_capacity(self.config.worker_count);
        for _ in 0..self.config.worker_count {
            let reconciler = Arc::clone(&self);
            let rx = Arc::clone(&rx);
            let worker_token = token.clone();
            workers.push(tokio::spawn(async move {
                reconciler.worker_loop(rx, worker_token).await;
            }));
        }

        info!(workers = self.config.worker_count, "reconciler starting");

        loop {
            if let Err(e) = self.enqueue_pending(&tx).await {
                warn!(error = %e, "resync sweep failed");
            }

            tokio::select! {
                _ = token.cancelled() => {
                    info!("reconciler shutting down");
                    drop(tx);
                    for worker in workers {
                        let _ = worker.await;
                    }
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.resync_interval) => {}
            }
        }
    }

    async fn enqueue_pending(&self, tx: &mpsc::Sender<String>) -> mbcas_core::Result<()> {
        let records = self
            .store
            .list()
            .map_err(|e| MbcasError::internal(format!("listing records: {e}")))?;

        let mut by_node: HashMap<String, Vec<PendingItem>> = HashMap::new();
        let mut no_node_order = Vec::new();

        for record in records.into_iter().filter(|r| r.status.phase == Phase::Pending) {
            let desired_mc = match parse_millicores(&record.spec.desired_cpu_limit) {
                Ok(v) => v,
                Err(_) => {
                    no_node_order.push(record.name.clone());
                    continue;
                }
            };

            match self.platform.get_pod(&record.spec.namespace, &record.spec.pod_name).await {
                Ok(pod) => {
                    let node_name = pod.spec.as_ref().and_then(|s| s.node_name.clone()).unwrap_or_default();
                    let current_mc = pod
                        .spec
                        .as_ref()
                        .and_then(|s| s.containers.first())
                        .and_then(|c| c.resources.as_ref())
                        .and_then(|r| r.requests.as_ref())
                        .and_then(|r| r.get("cpu"))
                        .and_then(|q| parse_millicores(&q.0).ok())
                        .unwrap_or(desired_mc);
                    by_node.entry(node_name).or_default().push(PendingItem { record, current_mc, desired_mc });
                }
                Err(_) => no_node_order.push(record.name.clone()),
            }
        }

        let mut ordered_names: Vec<String> = Vec::new();
        for (node_name, items) in by_node {
            let node_capacity_mc = match self.platform.get_node(&node_name).await {
                Ok(node) => node
                    .status
                    .as_ref()
                    .and_then(|s| s.allocatable.as_ref())
                    .and_then(|a| a.get("cpu"))
                    .and_then(|q| parse_millicores(&q.0).ok())
                    .unwrap_or(i64::MAX),
                Err(_) => i64::MAX,
            };
            for record in order_for_node(items, node_capacity_mc) {
                ordered_names.push(record.name);
            }
        }
        ordered_names.extend(no_node_order);

        for name in ordered_names {
            if tx.send(name.clone()).await.is_err() {
                warn!(record = %name, "reconciler queue closed, dropping enqueue");
            }
        }
        Ok(())
    }

    async fn worker_loop(self: Arc<Self>, rx: Arc<AsyncMutex<mpsc::Receiver<String>>>, token: CancellationToken) {
        loop {
            let name = tokio::select! {
                _ = token.cancelled() => return,
                item = async { rx.lock().await.recv().await } => {
                    match item {
                        Some(name) => name,
                        None => return,
                    }
                }
            };

            let lock = self.key_lock(&name);
            let _guard = lock.lock().await;
            self.reconcile_with_retry(&name).await;
        }
    }

    fn key_lock(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.key_locks.lock();
        locks.entry(name.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    async fn reconcile_with_retry(&self, name: &str) {
        for attempt in 1..=self.config.max_attempts_per_cycle {
            match self.reconcile_one(name).await {
                Ok(applied) => {
                    if applied {
                        debug!(record = name, attempt, "reconcile applied");
                    }
                    return;
                }
                Err(e) if e.kind() == mbcas_core::ErrorKind::Transient || e.kind() == mbcas_core::ErrorKind::Conflict => {
                    let delay = backoff_duration(attempt, self.config.backoff_base, self.config.backoff_cap);
                    warn!(record = name, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying after back-off");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(record = name, error = %e, "reconcile failed permanently for this cycle");
                    return;
                }
            }
        }
        warn!(record = name, "exhausted retry attempts this cycle; will retry on next resync");
    }

    /// Reconcile one record. Returns `Ok(true)` if a platform call was
    /// made, `Ok(false)` if the action was a no-op (already applied).
    async fn reconcile_one(&self, name: &str) -> mbcas_core::Result<bool> {
        let Some(mut record) = self
            .store
            .get(name)
            .map_err(|e| MbcasError::internal(format!("reading {name}: {e}")))?
        else {
            return Ok(false);
        };

        if record.status.phase != Phase::Pending {
            return Ok(false);
        }

        let pod = match self.platform.get_pod(&record.spec.namespace, &record.spec.pod_name).await {
            Ok(pod) => Some(pod),
            Err(mbcas_platform::PlatformError::PodNotFound { .. }) => None,
            Err(e) => return Err(MbcasError::transient("platform pod lookup", e.to_string())),
        };
        let pod_uid = pod.as_ref().and_then(|p| p.metadata.uid.as_deref());

        match decide(&record, pod_uid)? {
            ReconcileAction::Tombstone => {
                self.store
                    .delete(name)
                    .map_err(|e| MbcasError::internal(format!("deleting {name}: {e}")))?;
                info!(record = name, "tombstoned (pod absent or recreated)");
                Ok(true)
            }
            ReconcileAction::Skip => Ok(false),
            ReconcileAction::Apply(patch) => {
                match self
                    .platform
                    .resize_pod_cpu(&record.spec.namespace, &record.spec.pod_name, patch)
                    .await
                {
                    Ok(()) => {
                        record.status.phase = Phase::Applied;
                        record.status.applied_generation = record.generation;
                        record.status.last_applied_time = Some(chrono::Utc::now());
                        record.status.message = None;
                        self.put_status(record)?;
                        Ok(true)
                    }
                    Err(mbcas_platform::PlatformError::ResizeUnsupported { message, .. }) => {
                        record.status.phase = Phase::Failed;
                        record.status.message = Some(message);
                        self.put_status(record)?;
                        Ok(true)
                    }
                    Err(e) => Err(MbcasError::transient("platform resize", e.to_string())),
                }
            }
        }
    }

    fn put_status(&self, record: PodAllocation) -> mbcas_core::Result<()> {
        let name = record.name.clone();
        let expected = Some(record.generation);
        self.store
            .put(record, expected)
            .map_err(|e| MbcasError::internal(format!("writing status for {name}: {e}")))
    }
}
