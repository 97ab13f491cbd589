pub mod cgroup;
pub mod demand;
pub mod source;

pub use cgroup::CgroupReader;
pub use demand::{latent_demand_mc, DemandEstimator};
pub use source::DemandSource;
