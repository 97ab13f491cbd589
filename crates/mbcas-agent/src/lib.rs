//! MBCAS Agent - the per-node control loop: sense cgroup demand, bid into
//! the market, solve, check coalition stability, apply the fast guardrail,
//! and publish PodAllocation records.

pub mod agent;
pub mod config;
pub mod guardrail;
pub mod market_pass;
pub mod pods;
pub mod tracer;
pub mod writer;

pub use agent::Agent;
pub use config::AgentConfig;
pub use guardrail::{FastGuardrail, GuardrailOverride, LatencySource};
pub use market_pass::{run_market_pass, MarketPassResult};
pub use pods::{extract_managed, ManagedPod};
pub use tracer::{NoPathTracer, PathTracer};
pub use writer::AllocationWriter;
