use async_trait::async_trait;

/// An external request-tracing sink reporting which pods participated in
/// the same traced request path, in call order. Coalitions are built from
/// its output; an agent with no tracer configured runs the market solver
/// alone, with every ε-core check trivially satisfied (no coalitions).
#[async_trait]
pub trait PathTracer: Send + Sync {
    async fn traced_paths(&self, node_name: &str) -> Vec<(String, Vec<String>)>;
}

/// No tracing sink wired up. Yields no coalitions.
#[derive(Debug, Default)]
pub struct NoPathTracer;

#[async_trait]
impl PathTracer for NoPathTracer {
    async fn traced_paths(&self, _node_name: &str) -> Vec<(String, Vec<String>)> {
        Vec::new()
    }
}
