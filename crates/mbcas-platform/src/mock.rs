use crate::client::{CpuResizePatch, PlatformClient};
use crate::error::{PlatformError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory platform used by tests and local development. Tracks applied
/// resizes so tests can assert an in-place resize never touched pod UID
/// and never restarted the container.
pub struct MockPlatformClient {
    pods: RwLock<HashMap<(String, String), Pod>>,
    nodes: RwLock<HashMap<String, Node>>,
    applied_resizes: RwLock<Vec<(String, String, CpuResizePatch)>>,
    reject_resize: RwLock<bool>,
}

impl Default for MockPlatformClient {
    fn default() -> Self {
        Self {
            pods: RwLock::new(HashMap::new()),
            nodes: RwLock::new(HashMap::new()),
            applied_resizes: RwLock::new(Vec::new()),
            reject_resize: RwLock::new(false),
        }
    }
}

impl MockPlatformClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_pod(&self, pod: Pod) {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.pods.write().await.insert((namespace, name), pod);
    }

    pub async fn insert_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.write().await.insert(name, node);
    }

    pub async fn remove_pod(&self, namespace: &str, name: &str) {
        self.pods
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Make the next `resize_pod_cpu` call fail as `Unsupported`, to exercise
    /// a reconciler's permanent-error path.
    pub async fn reject_next_resize(&self) {
        *self.reject_resize.write().await = true;
    }

    pub async fn applied_resizes(&self) -> Vec<(String, String, CpuResizePatch)> {
        self.applied_resizes.read().await.clone()
    }
}

#[async_trait]
impl PlatformClient for MockPlatformClient {
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>> {
        Ok(self
            .pods
            .read()
            .await
            .values()
            .filter(|p| p.spec.as_ref().and_then(|s| s.node_name.as_deref()) == Some(node_name))
            .cloned()
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.pods
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| PlatformError::pod_not_found(namespace, name))
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        self.nodes
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| PlatformError::node_not_found(name))
    }

    async fn resize_pod_cpu(&self, namespace: &str, name: &str, patch: CpuResizePatch) -> Result<()> {
        if *self.reject_resize.read().await {
            *self.reject_resize.write().await = false;
            return Err(PlatformError::resize_unsupported(
                namespace,
                name,
                "mock platform configured to reject this resize",
            ));
        }

        let mut pods = self.pods.write().await;
        let pod = pods
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| PlatformError::pod_not_found(namespace, name))?;

        // Mutate the resource requests/limits in place; UID is never touched,
        // modeling the real platform's in-place resize subresource.
        if let Some(spec) = pod.spec.as_mut() {
            if let Some(container) = spec.containers.first_mut() {
                let resources = container.resources.get_or_insert_with(Default::default);
                let requests = resources.requests.get_or_insert_with(Default::default);
                requests.insert(
                    "cpu".to_string(),
                    k8s_openapi::apimachinery::pkg::api::resource::Quantity(format!("{}m", patch.request_mc)),
                );
                let limits = resources.limits.get_or_insert_with(Default::default);
                limits.insert(
                    "cpu".to_string(),
                    k8s_openapi::apimachinery::pkg::api::resource::Quantity(format!("{}m", patch.limit_mc)),
                );
            }
        }
        drop(pods);

        self.applied_resizes
            .write()
            .await
            .push((namespace.to_string(), name.to_string(), patch));
        Ok(())
    }
}
