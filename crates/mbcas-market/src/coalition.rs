use mbcas_core::types::Bid;
use std::collections::BTreeMap;

pub const MAX_COALITION_SIZE: usize = 8;
pub const COALITION_OVERLAP: usize = 4;
const NON_MEMBER_FLOOR_MC: i64 = 100;

/// A potential-value placeholder: latency(x) = 10 * (100 / x), x in
/// millicores. Chosen to stay close to the handed-down "10*(100/x)" hint
/// while keeping the model parameterizable, per the design notes.
const LATENCY_MODEL_K: f64 = 1000.0;

/// A set of pods traced together along one request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coalition {
    pub coalition_id: String,
    pub path_id: String,
    pub members: Vec<String>,
}

/// Split a traced path into coalitions of at most `MAX_COALITION_SIZE`
/// members, overlapping by `COALITION_OVERLAP` so every interior member
/// sits in two sub-coalitions.
pub fn split_path_into_coalitions(path_id: &str, ordered_uids: &[String]) -> Vec<Coalition> {
    if ordered_uids.is_empty() {
        return Vec::new();
    }
    if ordered_uids.len() <= MAX_COALITION_SIZE {
        return vec![Coalition {
            coalition_id: format!("{}-0", path_id),
            path_id: path_id.to_string(),
            members: ordered_uids.to_vec(),
        }];
    }

    let step = MAX_COALITION_SIZE - COALITION_OVERLAP;
    let mut coalitions = Vec::new();
    let mut start = 0;
    let mut idx = 0;
    loop {
        let end = (start + MAX_COALITION_SIZE).min(ordered_uids.len());
        coalitions.push(Coalition {
            coalition_id: format!("{}-{}", path_id, idx),
            path_id: path_id.to_string(),
            members: ordered_uids[start..end].to_vec(),
        });
        idx += 1;
        if end == ordered_uids.len() {
            break;
        }
        start += step;
    }
    coalitions
}

fn latency_ms(cpu_mc: f64) -> f64 {
    if cpu_mc <= 0.0 {
        f64::INFINITY
    } else {
        LATENCY_MODEL_K / cpu_mc
    }
}

/// The characteristic-function value of a subset, in CPU millicores: its
/// combined demand scaled by the fractional latency improvement a
/// proportional-by-weight coordinated allocation offers over each member
/// sitting alone at its floor. Clamped at 0 (coordinating never costs).
pub fn coalition_value_mc(members: &[Bid]) -> f64 {
    if members.is_empty() {
        return 0.0;
    }

    let sum_demand: f64 = members.iter().map(|b| b.demand_mc as f64).sum();
    let baseline: f64 = members.iter().map(|b| latency_ms(b.min_mc as f64)).sum();

    if !baseline.is_finite() || baseline <= 0.0 {
        return 0.0;
    }

    let sum_weight: f64 = members.iter().map(|b| b.weight).sum();
    let optimized: f64 = members
        .iter()
        .map(|b| {
            let share = if sum_weight > 0.0 {
                sum_demand * b.weight / sum_weight
            } else {
                sum_demand / members.len() as f64
            };
            latency_ms(share)
        })
        .sum();

    let improvement = ((baseline - optimized) / baseline).clamp(0.0, 1.0);
    (sum_demand * improvement).max(0.0)
}

#[derive(Debug, Clone)]
pub struct CoreCheckResult {
    pub stable: bool,
    pub blocking_subset: Option<Vec<String>>,
    pub deficit_mc: f64,
}

/// Check whether `allocation` is in the ε-core of the coalition game over
/// `members`: for every non-empty proper subset S, Σ_{i∈S} xᵢ ≥ v(S) − ε.
/// Returns the first blocking subset found, if any.
pub fn check_core(members: &[Bid], allocation: &BTreeMap<String, i64>, epsilon_mc: f64) -> CoreCheckResult {
    let n = members.len();
    if n < 2 {
        return CoreCheckResult {
            stable: true,
            blocking_subset: None,
            deficit_mc: 0.0,
        };
    }

    for mask in 1..(1u32 << n) - 1 {
        let subset: Vec<&Bid> = (0..n).filter(|i| mask & (1 << i) != 0).map(|i| &members[i]).collect();
        let v = coalition_value_mc(&subset.iter().map(|b| (*b).clone()).collect::<Vec<_>>());
        let sum_x: f64 = subset.iter().map(|b| *allocation.get(&b.uid).unwrap_or(&0) as f64).sum();

        if sum_x < v - epsilon_mc {
            return CoreCheckResult {
                stable: false,
                blocking_subset: Some(subset.iter().map(|b| b.uid.clone()).collect()),
                deficit_mc: v - sum_x,
            };
        }
    }

    CoreCheckResult {
        stable: true,
        blocking_subset: None,
        deficit_mc: 0.0,
    }
}

/// Move `deficit` millicores from the complement of a blocking subset to
/// its members, re-checking up to `max_iterations` times. Returns `true`
/// if the ε-core holds afterward; `false` means the caller should mark
/// the allocation `UnstableAccepted` and publish it regardless.
pub fn resolve_blocking(
    members: &[Bid],
    allocation: &mut BTreeMap<String, i64>,
    epsilon_mc: f64,
    max_iterations: u32,
) -> bool {
    for _ in 0..max_iterations {
        let result = check_core(members, allocation, epsilon_mc);
        let Some(blocking) = result.blocking_subset else {
            return true;
        };

        let deficit = result.deficit_mc.ceil() as i64;
        if deficit <= 0 {
            return true;
        }

        let complement: Vec<&Bid> = members.iter().filter(|b| !blocking.contains(&b.uid)).collect();
        if complement.is_empty() {
            return false;
        }

        let per_nonmember = (deficit as f64 / complement.len() as f64).ceil() as i64;
        let mut taken = 0i64;
        for bid in &complement {
            let current = *allocation.get(&bid.uid).unwrap_or(&0);
            let available = (current - NON_MEMBER_FLOOR_MC).max(0);
            let take = per_nonmember.min(available);
            if take > 0 {
                allocation.insert(bid.uid.clone(), current - take);
                taken += take;
            }
        }

        if taken == 0 {
            return false;
        }

        let per_member = (taken as f64 / blocking.len() as f64).ceil() as i64;
        let mut remaining = taken;
        for uid in &blocking {
            if remaining <= 0 {
                break;
            }
            let give = per_member.min(remaining);
            let current = *allocation.get(uid).unwrap_or(&0);
            allocation.insert(uid.clone(), current + give);
            remaining -= give;
        }
    }

    check_core(members, allocation, epsilon_mc).stable
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
    fn short_path_becomes_single_coalition() {
        let uids: Vec<String> = (0..5).map(|i| format!("uid-{}", i)).collect();
        let coalitions = split_path_into_coalitions("path-a", &uids);
        assert_eq!(coalitions.len(), 1);
        assert_eq!(coalitions[0].members, uids);
    }

    #[test]
    fn long_path_splits_with_overlap() {
        let uids: Vec<String> = (0..10).map(|i| format!("uid-{}", i)).collect();
        let coalitions = split_path_into_coalitions("path-a", &uids);
        assert_eq!(coalitions.len(), 2);
        assert_eq!(coalitions[0].members.len(), 8);
        assert_eq!(coalitions[1].members.len(), 6);

        let mut covered = std::collections::HashSet::new();
        for c in &coalitions {
            covered.extend(c.members.iter().cloned());
        }
        assert_eq!(covered.len(), uids.len());

        // interior members (4..8) appear in both windows
        for uid in &uids[4..8] {
            assert!(coalitions[0].members.contains(uid));
            assert!(coalitions[1].members.contains(uid));
        }
    }

    #[test]
    fn generous_allocation_is_in_core() {
        let members = vec![bid("a", 500, 1.0, 100, 1000), bid("b", 500, 1.0, 100, 1000)];
        let mut allocation = BTreeMap::new();
        allocation.insert("a".to_string(), 500);
        allocation.insert("b".to_string(), 500);

        let result = check_core(&members, &allocation, 10.0);
        assert!(result.stable);
    }

    #[test]
    fn starved_member_blocks_the_core() {
        let members = vec![bid("a", 900, 1.0, 100, 1000), bid("b", 900, 1.0, 100, 1000)];
        let mut allocation = BTreeMap::new();
        allocation.insert("a".to_string(), 950);
        allocation.insert("b".to_string(), 50);

        let result = check_core(&members, &allocation, 1.0);
        assert!(!result.stable);
        assert_eq!(result.blocking_subset, Some(vec!["b".to_string()]));
    }

    #[test]
    fn resolve_blocking_converges_within_bounded_iterations() {
        // Demand kept low enough that both singleton core constraints are
        // jointly satisfiable within the pair's combined 1000 mc.
        let members = vec![bid("a", 300, 1.0, 100, 1000), bid("b", 300, 1.0, 100, 1000)];
        let mut allocation = BTreeMap::new();
        allocation.insert("a".to_string(), 950);
        allocation.insert("b".to_string(), 50);

        let stable = resolve_blocking(&members, &mut allocation, 1.0, 3);
        assert!(stable);
        assert!(allocation["b"] > 50);
        assert!(allocation["a"] < 950);
    }

    #[test]
    fn resolve_blocking_gives_up_after_bounded_iterations_when_core_is_empty() {
        // Both singletons demand more jointly than the pair's total
        // capacity can ever satisfy simultaneously: the core is empty.
        let members = vec![bid("a", 900, 1.0, 100, 1000), bid("b", 900, 1.0, 100, 1000)];
        let mut allocation = BTreeMap::new();
        allocation.insert("a".to_string(), 950);
        allocation.insert("b".to_string(), 50);

        let stable = resolve_blocking(&members, &mut allocation, 1.0, 3);
        assert!(!stable);
    }
}
