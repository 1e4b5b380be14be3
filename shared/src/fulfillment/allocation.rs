//! Allocation planning: sourcing shortfall from sibling storage points or
//! routing it to purchase

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::availability::LineShortfall;
use crate::models::DeliveryMode;

/// Available stock of one variant at one candidate source storage point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStock {
    pub storage_point_id: Uuid,
    /// Configured storage point priority; lower is preferred
    pub priority: i32,
    pub available: i64,
}

/// Quantity of one variant to move on a planned transfert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAllocation {
    pub variant_id: Uuid,
    pub quantity: i64,
}

/// Quantity of one variant routed to procurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseAllocation {
    pub variant_id: Uuid,
    pub quantity: i64,
}

/// Outcome of planning: one transfert per distinct source storage point,
/// plus a flat list of purchase lines for the unfulfilled remainder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    /// Keyed by source storage point; BTreeMap keeps commit order stable
    pub transfers: BTreeMap<Uuid, Vec<TransferAllocation>>,
    pub purchases: Vec<PurchaseAllocation>,
}

impl AllocationPlan {
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty() && self.purchases.is_empty()
    }

    pub fn transfer_total(&self) -> i64 {
        self.transfers
            .values()
            .flat_map(|lines| lines.iter())
            .map(|l| l.quantity)
            .sum()
    }

    pub fn purchase_total(&self) -> i64 {
        self.purchases.iter().map(|l| l.quantity).sum()
    }
}

/// Plan how to source `shortfalls` for an order at `delivery_mode`.
///
/// `sources` maps each variant to the sibling storage points holding
/// available stock of it (the requesting storage point must not appear).
/// Candidates are consumed greedily in (priority ASC, storage point id ASC)
/// order, a stable documented tie-break. Whatever no candidate can cover
/// becomes a purchase line.
///
/// Business rule: `DeliveryMode::InAgency` never sources via transfert; the
/// entire shortfall routes to purchase regardless of sibling stock.
pub fn plan_allocation(
    shortfalls: &[LineShortfall],
    sources: &HashMap<Uuid, Vec<SourceStock>>,
    delivery_mode: DeliveryMode,
) -> AllocationPlan {
    let mut plan = AllocationPlan::default();

    for shortfall in shortfalls {
        let mut remaining = shortfall.missing;
        if remaining <= 0 {
            continue;
        }

        if delivery_mode == DeliveryMode::AtHome {
            let mut candidates: Vec<SourceStock> = sources
                .get(&shortfall.variant_id)
                .map(|c| c.to_vec())
                .unwrap_or_default();
            candidates.sort_by_key(|c| (c.priority, c.storage_point_id));

            for candidate in candidates {
                if remaining == 0 {
                    break;
                }
                let take = candidate.available.max(0).min(remaining);
                if take == 0 {
                    continue;
                }
                plan.transfers
                    .entry(candidate.storage_point_id)
                    .or_default()
                    .push(TransferAllocation {
                        variant_id: shortfall.variant_id,
                        quantity: take,
                    });
                remaining -= take;
            }
        }

        if remaining > 0 {
            plan.purchases.push(PurchaseAllocation {
                variant_id: shortfall.variant_id,
                quantity: remaining,
            });
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shortfall(variant_id: Uuid, missing: i64) -> LineShortfall {
        LineShortfall {
            variant_id,
            requested: missing,
            available: 0,
            missing,
        }
    }

    fn source(sp: Uuid, priority: i32, available: i64) -> SourceStock {
        SourceStock {
            storage_point_id: sp,
            priority,
            available,
        }
    }

    #[test]
    fn covers_shortfall_from_single_source() {
        let v = Uuid::new_v4();
        let sp = Uuid::new_v4();
        let sources = HashMap::from([(v, vec![source(sp, 1, 3)])]);
        let plan = plan_allocation(&[shortfall(v, 3)], &sources, DeliveryMode::AtHome);
        assert_eq!(plan.transfer_total(), 3);
        assert!(plan.purchases.is_empty());
        assert_eq!(plan.transfers[&sp][0].quantity, 3);
    }

    #[test]
    fn splits_across_sources_by_priority() {
        let v = Uuid::new_v4();
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        let sources = HashMap::from([(v, vec![source(far, 9, 10), source(near, 1, 2)])]);
        let plan = plan_allocation(&[shortfall(v, 5)], &sources, DeliveryMode::AtHome);
        assert_eq!(plan.transfers[&near][0].quantity, 2);
        assert_eq!(plan.transfers[&far][0].quantity, 3);
        assert!(plan.purchases.is_empty());
    }

    #[test]
    fn remainder_routes_to_purchase() {
        let v = Uuid::new_v4();
        let sp = Uuid::new_v4();
        let sources = HashMap::from([(v, vec![source(sp, 1, 2)])]);
        let plan = plan_allocation(&[shortfall(v, 5)], &sources, DeliveryMode::AtHome);
        assert_eq!(plan.transfer_total(), 2);
        assert_eq!(plan.purchase_total(), 3);
    }

    #[test]
    fn in_agency_skips_transfers_entirely() {
        let v = Uuid::new_v4();
        let sp = Uuid::new_v4();
        let sources = HashMap::from([(v, vec![source(sp, 1, 100)])]);
        let plan = plan_allocation(&[shortfall(v, 5)], &sources, DeliveryMode::InAgency);
        assert!(plan.transfers.is_empty());
        assert_eq!(plan.purchase_total(), 5);
    }

    #[test]
    fn tie_break_is_stable_on_storage_point_id() {
        let v = Uuid::new_v4();
        let mut ids = [Uuid::new_v4(), Uuid::new_v4()];
        ids.sort();
        // Same priority: the smaller id drains first
        let sources = HashMap::from([(v, vec![source(ids[1], 5, 10), source(ids[0], 5, 10)])]);
        let plan = plan_allocation(&[shortfall(v, 4)], &sources, DeliveryMode::AtHome);
        assert_eq!(plan.transfers.len(), 1);
        assert_eq!(plan.transfers[&ids[0]][0].quantity, 4);
    }

    #[test]
    fn no_sources_means_pure_purchase() {
        let v = Uuid::new_v4();
        let plan = plan_allocation(&[shortfall(v, 7)], &HashMap::new(), DeliveryMode::AtHome);
        assert!(plan.transfers.is_empty());
        assert_eq!(plan.purchase_total(), 7);
    }
}
