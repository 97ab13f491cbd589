use mbcas_core::types::{Bid, DemandEstimate, PodPolicy};

const FLOOR_BID_WEIGHT: f64 = 0.1;

/// Build a bid for a managed pod. A pod with a valid demand estimate bids
/// its latent demand (never below its request); a pod still warming up
/// contributes a floor bid so it neither dominates nor starves.
pub fn build_bid(
    uid: &str,
    request_mc: i64,
    policy: &PodPolicy,
    node_allocatable_mc: i64,
    estimate: Option<DemandEstimate>,
) -> Bid {
    let min_mc = policy.min_mc.unwrap_or(request_mc).max(0);
    let max_mc = policy
        .max_mc
        .unwrap_or(node_allocatable_mc)
        .min(node_allocatable_mc)
        .max(min_mc);

    let (demand_mc, weight) = match estimate {
        Some(estimate) => {
            let demand = (estimate.latent_demand_mc.round() as i64).max(request_mc);
            (demand, policy.weight.unwrap_or(1.0))
        }
        None => (request_mc, FLOOR_BID_WEIGHT),
    };

    Bid {
        uid: uid.to_string(),
        demand_mc: demand_mc.clamp(min_mc, max_mc),
        weight,
        min_mc,
        max_mc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_demand_bids_latent_demand_with_policy_weight() {
        let policy = PodPolicy {
            weight: Some(2.0),
            ..Default::default()
        };
        let estimate = DemandEstimate {
            usage_mc: 400.0,
            throttling_ratio: 0.0,
            latent_demand_mc: 400.0,
        };
        let bid = build_bid("uid-1", 100, &policy, 4000, Some(estimate));
        assert_eq!(bid.demand_mc, 400);
        assert_eq!(bid.weight, 2.0);
        assert_eq!(bid.min_mc, 100);
    }

    #[test]
    fn missing_estimate_yields_floor_bid() {
        let policy = PodPolicy::default();
        let bid = build_bid("uid-1", 150, &policy, 4000, None);
        assert_eq!(bid.demand_mc, 150);
        assert_eq!(bid.weight, FLOOR_BID_WEIGHT);
    }

    #[test]
    fn demand_never_drops_below_request() {
        let policy = PodPolicy::default();
        let estimate = DemandEstimate {
            usage_mc: 50.0,
            throttling_ratio: 0.0,
            latent_demand_mc: 50.0,
        };
        let bid = build_bid("uid-1", 200, &policy, 4000, Some(estimate));
        assert_eq!(bid.demand_mc, 200);
    }

    #[test]
    fn max_is_capped_by_node_allocatable() {
        let policy = PodPolicy {
            max_mc: Some(10_000),
            ..Default::default()
        };
        let bid = build_bid("uid-1", 100, &policy, 4000, None);
        assert_eq!(bid.max_mc, 4000);
    }
}
