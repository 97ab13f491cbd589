pub mod client;
pub mod error;
pub mod http;
pub mod mock;

pub use client::{CpuResizePatch, PlatformClient};
pub use error::{PlatformError, Result};
pub use http::HttpPlatformClient;
pub use mock::MockPlatformClient;
