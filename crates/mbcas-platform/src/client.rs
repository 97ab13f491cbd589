use crate::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};

/// A requested in-place resize of a pod's primary container CPU request
/// and limit.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuResizePatch {
    pub request_mc: i64,
    pub limit_mc: i64,
}

/// Capability interface for the orchestration platform's watch/list API
/// and its in-place-resize subresource. One HTTP implementation talks to
/// the real platform; a mock implementation backs tests and local
/// development.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// List every pod currently assigned to `node_name`.
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>>;

    /// Fetch a single pod by namespace/name.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// Fetch node allocatable capacity.
    async fn get_node(&self, name: &str) -> Result<Node>;

    /// Apply an in-place CPU resize to a pod's primary container. Must
    /// never restart the container.
    async fn resize_pod_cpu(&self, namespace: &str, name: &str, patch: CpuResizePatch) -> Result<()>;
}
