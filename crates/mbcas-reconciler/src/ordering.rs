use mbcas_core::PodAllocation;

/// One pending record plus the node-local context needed to order it:
/// the pod's current live CPU request and the desired value this record
/// asks for.
pub struct PendingItem {
    pub record: PodAllocation,
    pub current_mc: i64,
    pub desired_mc: i64,
}

/// Within one node's pending batch, process decreases before increases
/// when their combined desired requests would exceed `node_capacity_mc`;
/// otherwise preserve arrival order (a stable sort is a no-op in that
/// case since all items compare equal).
pub fn order_for_node(mut items: Vec<PendingItem>, node_capacity_mc: i64) -> Vec<PodAllocation> {
    let sum_desired: i64 = items.iter().map(|i| i.desired_mc).sum();
    if sum_desired > node_capacity_mc {
        items.sort_by_key(|i| direction_rank(i.current_mc, i.desired_mc));
    }
    items.into_iter().map(|i| i.record).collect()
}

fn direction_rank(current_mc: i64, desired_mc: i64) -> u8 {
    if desired_mc < current_mc {
        0
    } else {
        1
    }
}
