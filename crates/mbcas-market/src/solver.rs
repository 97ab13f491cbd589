use crate::allocator::Allocator;
use mbcas_core::types::{Allocation, Bid};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Water-filling solver for the Nash-bargained CPU market:
///
///     maximize   Σ wᵢ · log(min(xᵢ, dᵢ) − mᵢ + 1)
///     subject to mᵢ ≤ xᵢ ≤ Mᵢ,  Σ xᵢ ≤ C
///
/// A pod's own demand is treated as an aspiration ceiling alongside its
/// policy max: once `xᵢ` reaches `dᵢ` the marginal utility of more CPU is
/// zero, so an uncontended pod settles at its demand rather than its cap.
#[derive(Debug, Default)]
pub struct NashMarketSolver;

impl NashMarketSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Allocator for NashMarketSolver {
    fn solve(&self, bids: &[Bid], usable_capacity_mc: i64) -> Allocation {
        solve(bids, usable_capacity_mc)
    }

    fn name(&self) -> &str {
        "nash-water-filling"
    }
}

pub fn solve(bids: &[Bid], usable_capacity_mc: i64) -> Allocation {
    if bids.is_empty() {
        return Allocation::default();
    }

    let mut bids: Vec<Bid> = bids.to_vec();
    bids.sort_by(|a, b| a.uid.cmp(&b.uid));

    let sum_mins: i64 = bids.iter().map(|b| b.min_mc.max(0)).sum();
    let remaining0 = usable_capacity_mc - sum_mins;

    if remaining0 < 0 {
        return infeasible_scale(&bids, usable_capacity_mc);
    }

    // cap_i is the tighter of the policy max and the pod's own demand: a
    // pod never benefits from CPU beyond what it asked for.
    let caps: HashMap<String, i64> = bids
        .iter()
        .map(|b| (b.uid.clone(), b.demand_mc.clamp(b.min_mc, b.max_mc)))
        .collect();

    let mut x: HashMap<String, i64> = bids.iter().map(|b| (b.uid.clone(), b.min_mc.max(0))).collect();
    let mut remaining = remaining0;
    let mut active: HashSet<String> = bids
        .iter()
        .filter(|b| x[&b.uid] < caps[&b.uid])
        .map(|b| b.uid.clone())
        .collect();

    let mut shadow_price = 0.0;

    loop {
        if active.is_empty() {
            break;
        }

        let sum_w: f64 = bids.iter().filter(|b| active.contains(&b.uid)).map(|b| b.weight).sum();
        if sum_w <= 0.0 {
            break;
        }

        let lambda = sum_w / (remaining as f64 + active.len() as f64);

        let mut newly_capped = Vec::new();
        let mut newly_floored = Vec::new();
        for bid in bids.iter().filter(|b| active.contains(&b.uid)) {
            let raw_share = bid.weight / lambda - 1.0;
            let candidate = bid.min_mc as f64 + raw_share;
            if candidate >= caps[&bid.uid] as f64 {
                newly_capped.push(bid.uid.clone());
            } else if raw_share < 0.0 {
                // This bid's water level sits below its own floor at the
                // current lambda; pin it at min and drop it from the
                // active set so lambda is recomputed over only the bids
                // that actually absorb the remaining capacity.
                newly_floored.push(bid.uid.clone());
            }
        }

        if newly_capped.is_empty() && newly_floored.is_empty() {
            shadow_price = lambda;
            finalize_active(&bids, &active, lambda, remaining, &mut x);
            break;
        }

        for uid in &newly_capped {
            let cap = caps[uid];
            let capped_amount = cap - x[uid];
            x.insert(uid.clone(), cap);
            remaining -= capped_amount;
            active.remove(uid);
        }
        for uid in &newly_floored {
            active.remove(uid);
        }
    }

    let per_pod_mc: BTreeMap<String, i64> = x.into_iter().collect();
    Allocation {
        per_pod_mc,
        shadow_price,
        degraded: false,
    }
}

fn finalize_active(bids: &[Bid], active: &HashSet<String>, lambda: f64, remaining: i64, x: &mut HashMap<String, i64>) {
    let mut growth: HashMap<String, i64> = HashMap::new();
    for bid in bids.iter().filter(|b| active.contains(&b.uid)) {
        let share = (bid.weight / lambda - 1.0).max(0.0);
        growth.insert(bid.uid.clone(), share.floor() as i64);
    }

    let sum_growth: i64 = growth.values().sum();
    let mut leftover = remaining - sum_growth;

    let mut order: Vec<&Bid> = bids.iter().filter(|b| active.contains(&b.uid)).collect();
    order.sort_by(|a, b| {
        let ka = a.weight * a.demand_mc as f64;
        let kb = b.weight * b.demand_mc as f64;
        kb.partial_cmp(&ka).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.uid.cmp(&b.uid))
    });

    for bid in order {
        if leftover <= 0 {
            break;
        }
        *growth.get_mut(&bid.uid).unwrap() += 1;
        leftover -= 1;
    }

    for bid in bids.iter().filter(|b| active.contains(&b.uid)) {
        x.insert(bid.uid.clone(), bid.min_mc + growth[&bid.uid]);
    }
}

fn infeasible_scale(bids: &[Bid], usable_capacity_mc: i64) -> Allocation {
    let sum_mins: i64 = bids.iter().map(|b| b.min_mc.max(0)).sum();
    let scale = if sum_mins > 0 {
        usable_capacity_mc as f64 / sum_mins as f64
    } else {
        0.0
    };

    let per_pod_mc = bids
        .iter()
        .map(|b| (b.uid.clone(), ((b.min_mc as f64) * scale).floor().max(0.0) as i64))
        .collect();

    Allocation {
        per_pod_mc,
        shadow_price: 0.0,
        degraded: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(uid: &str, demand_mc: i64, weight: f64, min_mc: i64, max_mc: i64) -> Bid {
        Bid {
            uid: uid.to_string(),
            demand_mc,
            weight,
            min_mc,
            max_mc,
        }
    }

    #[test]
    fn uncontended_pod_settles_at_demand() {
        let bids = vec![bid("a", 300, 1.0, 100, 1000)];
        let result = solve(&bids, 3600);
        assert_eq!(result.per_pod_mc["a"], 300);
        assert_eq!(result.shadow_price, 0.0);
        assert!(!result.degraded);
    }

    #[test]
    fn contended_equal_weights_split_evenly() {
        let bids = vec![
            bid("a", 800, 1.0, 100, 1000),
            bid("b", 800, 1.0, 100, 1000),
        ];
        let result = solve(&bids, 1000);
        assert_eq!(result.per_pod_mc["a"], 500);
        assert_eq!(result.per_pod_mc["b"], 500);
        assert!(result.shadow_price > 0.0);
    }

    #[test]
    fn contended_weighted_splits_proportionally() {
        let bids = vec![
            bid("a", 800, 2.0, 100, 1000),
            bid("b", 800, 1.0, 100, 1000),
        ];
        let result = solve(&bids, 1000);
        assert_eq!(result.per_pod_mc["a"] + result.per_pod_mc["b"], 1000);
        assert!((result.per_pod_mc["a"] - 634).abs() <= 1);
        assert!((result.per_pod_mc["b"] - 366).abs() <= 1);
    }

    #[test]
    fn throttled_demand_reflected_in_uncontended_bid() {
        // usage 300 mc, throttling 0.5 -> latent demand 600 mc, uncontended
        let bids = vec![bid("a", 600, 1.0, 100, 10_000)];
        let result = solve(&bids, 100_000);
        assert_eq!(result.per_pod_mc["a"], 600);
    }

    #[test]
    fn infeasible_minimums_scale_proportionally() {
        let bids = vec![
            bid("a", 700, 1.0, 600, 1000),
            bid("b", 700, 1.0, 600, 1000),
        ];
        let result = solve(&bids, 1000);
        assert!(result.degraded);
        assert_eq!(result.per_pod_mc["a"], 500);
        assert_eq!(result.per_pod_mc["b"], 500);
    }

    #[test]
    fn solver_never_exceeds_capacity_or_box_bounds() {
        let bids = vec![
            bid("a", 900, 3.0, 50, 700),
            bid("b", 300, 1.0, 50, 400),
            bid("c", 1200, 0.5, 100, 1500),
        ];
        let result = solve(&bids, 1400);
        let total: i64 = result.per_pod_mc.values().sum();
        assert!(total <= 1400);
        for b in &bids {
            let x = result.per_pod_mc[&b.uid];
            assert!(x >= b.min_mc && x <= b.max_mc);
        }
    }

    #[test]
    fn low_weight_bids_pin_at_floor_under_zero_remaining_capacity() {
        let bids = vec![
            bid("p1", 10_000, 0.1, 0, 10_000),
            bid("p2", 10_000, 0.1, 0, 10_000),
            bid("p3", 10_000, 0.1, 0, 10_000),
            bid("p4", 10_000, 3.0, 0, 10_000),
            bid("p5", 10_000, 0.1, 0, 10_000),
        ];
        let result = solve(&bids, 0);
        let total: i64 = result.per_pod_mc.values().sum();
        assert_eq!(total, 0);
        for b in &bids {
            assert_eq!(result.per_pod_mc[&b.uid], 0);
        }
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let bids = vec![
            bid("b", 800, 1.0, 100, 1000),
            bid("a", 800, 2.0, 100, 1000),
        ];
        let r1 = solve(&bids, 1000);
        let r2 = solve(&bids, 1000);
        assert_eq!(r1.per_pod_mc, r2.per_pod_mc);
        assert_eq!(r1.shadow_price, r2.shadow_price);
    }
}
