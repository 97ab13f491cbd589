pub mod allocator;
pub mod bid;
pub mod coalition;
pub mod solver;

pub use allocator::Allocator;
pub use bid::build_bid;
pub use coalition::{
    check_core, coalition_value_mc, resolve_blocking, split_path_into_coalitions, Coalition, CoreCheckResult,
    COALITION_OVERLAP, MAX_COALITION_SIZE,
};
pub use solver::{solve, NashMarketSolver};
