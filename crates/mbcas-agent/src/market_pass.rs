use mbcas_market::{check_core, resolve_blocking, Allocator, Coalition};
use mbcas_core::types::{Allocation, Bid};
use std::collections::HashMap;

/// Result of one solve-and-stabilize pass: the (possibly adjusted)
/// allocation plus whether any coalition was left `UnstableAccepted`.
#[derive(Debug, Clone)]
pub struct MarketPassResult {
    pub allocation: Allocation,
    pub any_unstable: bool,
}

/// Run the solver, then check and repair ε-core stability for every
/// coalition whose members are all present in `bids`. Coalitions that
/// reference a pod not in `bids` (stale tracing data) are skipped.
pub fn run_market_pass(
    bids: &[Bid],
    usable_capacity_mc: i64,
    allocator: &dyn Allocator,
    coalitions: &[Coalition],
    epsilon_core_mc: f64,
) -> MarketPassResult {
    let mut allocation = allocator.solve(bids, usable_capacity_mc);
    let by_uid: HashMap<&str, &Bid> = bids.iter().map(|b| (b.uid.as_str(), b)).collect();

    let mut any_unstable = false;
    for coalition in coalitions {
        let members: Option<Vec<Bid>> = coalition
            .members
            .iter()
            .map(|uid| by_uid.get(uid.as_str()).map(|b| (*b).clone()))
            .collect();
        let Some(members) = members else {
            continue;
        };
        if members.len() < 2 {
            continue;
        }

        let result = check_core(&members, &allocation.per_pod_mc, epsilon_core_mc);
        if result.stable {
            continue;
        }

        let stable = resolve_blocking(&members, &mut allocation.per_pod_mc, epsilon_core_mc, 3);
        if !stable {
            any_unstable = true;
        }
    }

    MarketPassResult { allocation, any_unstable }
}
