use mbcas_core::types::{Allocation, Bid};

/// A pluggable market-clearing strategy: takes one node's bids and its
/// usable capacity, returns a feasible allocation plus shadow price.
pub trait Allocator: Send + Sync {
    fn solve(&self, bids: &[Bid], usable_capacity_mc: i64) -> Allocation;

    fn name(&self) -> &str;
}
