use crate::client::{CpuResizePatch, PlatformClient};
use crate::error::{PlatformError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

/// HTTP client against the orchestration platform's REST surface.
pub struct HttpPlatformClient {
    base_url: String,
    client: Client,
}

impl HttpPlatformClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>> {
        let url = format!("{}/api/v1/pods?fieldSelector=spec.nodeName={}", self.base_url, node_name);
        debug!("GET {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PlatformError::request_failed(format!("list pods failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(PlatformError::request_failed(format!(
                "list pods returned status {}",
                resp.status()
            )));
        }

        resp.json::<Vec<Pod>>()
            .await
            .map_err(|e| PlatformError::request_failed(format!("failed to parse pod list: {}", e)))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        let url = format!("{}/api/v1/namespaces/{}/pods/{}", self.base_url, namespace, name);
        debug!("GET {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PlatformError::request_failed(format!("get pod failed: {}", e)))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PlatformError::pod_not_found(namespace, name));
        }
        if !resp.status().is_success() {
            return Err(PlatformError::request_failed(format!(
                "get pod returned status {}",
                resp.status()
            )));
        }

        resp.json::<Pod>()
            .await
            .map_err(|e| PlatformError::request_failed(format!("failed to parse pod: {}", e)))
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        let url = format!("{}/api/v1/nodes/{}", self.base_url, name);
        debug!("GET {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PlatformError::request_failed(format!("get node failed: {}", e)))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PlatformError::node_not_found(name));
        }
        if !resp.status().is_success() {
            return Err(PlatformError::request_failed(format!(
                "get node returned status {}",
                resp.status()
            )));
        }

        resp.json::<Node>()
            .await
            .map_err(|e| PlatformError::request_failed(format!("failed to parse node: {}", e)))
    }

    async fn resize_pod_cpu(&self, namespace: &str, name: &str, patch: CpuResizePatch) -> Result<()> {
        let url = format!(
            "{}/api/v1/namespaces/{}/pods/{}/resize",
            self.base_url, namespace, name
        );
        debug!("PATCH {} ({:?})", url, patch);

        let body = json!({
            "spec": {
                "containers": [{
                    "name": "*",
                    "resources": {
                        "requests": { "cpu": format!("{}m", patch.request_mc) },
                        "limits": { "cpu": format!("{}m", patch.limit_mc) },
                    }
                }]
            }
        });

        let resp = self
            .client
            .patch(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::request_failed(format!("resize request failed: {}", e)))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PlatformError::pod_not_found(namespace, name));
        }
        if resp.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY
            || resp.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED
        {
            let body = resp.text().await.unwrap_or_default();
            return Err(PlatformError::resize_unsupported(namespace, name, body));
        }
        if !resp.status().is_success() {
            return Err(PlatformError::request_failed(format!(
                "resize returned status {}",
                resp.status()
            )));
        }

        Ok(())
    }
}
