//! Disbursement planning
//!
//! Pure tranche and fee computation for a transfer. Given an amount, a
//! payment network and the requested options, `plan` returns the payment
//! breakdown and the fee structure. The function is deterministic and has no
//! side effects, so clients can run the same simulation before committing to
//! a transfer.
//!
//! All amounts are integer minor units. Fee values and tier thresholds are
//! policy, supplied via [`FeePolicy`] rather than hardcoded here.

use serde::{Deserialize, Serialize};

/// Payment network a transfer is routed through
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Domestic / EU-zone network
    Sepa,
    /// International network
    Swift,
}

/// Who carries the transfer costs (SWIFT cost-allocation option)
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CostAllocation {
    /// Costs shared with the beneficiary (SHA)
    #[default]
    Shared,
    /// Sender covers all costs, including correspondent banks (OUR)
    Our,
}

/// Fee and tranche policy constants.
///
/// Defaults mirror the published price sheet; deployments override them from
/// configuration when the business rules change.
#[derive(Debug, Clone)]
pub struct FeePolicy {
    /// Amount above which a transfer is split into staged tranches
    pub staged_threshold: i64,
    /// Amount above which a SWIFT transfer gets the four-tranche breakdown
    pub swift_staged_threshold: i64,

    /// SEPA base fee tiers: (amount ceiling, fee), evaluated in order
    pub sepa_tiers: [(i64, i64); 3],
    /// SEPA base fee above the last tier ceiling
    pub sepa_top_fee: i64,
    /// Flat SEPA surcharge for urgent execution
    pub sepa_urgent_surcharge: i64,

    /// Flat SWIFT base fee
    pub swift_base_fee: i64,
    /// Flat SWIFT surcharge for urgent execution
    pub swift_urgent_surcharge: i64,
    /// SWIFT processing fee rate in basis points of the amount
    pub swift_processing_rate_bps: i64,
    /// Cap on the SWIFT processing fee
    pub swift_processing_cap: i64,
    /// Correspondent-bank fee, charged only under OUR cost allocation
    pub swift_correspondent_fee: i64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            staged_threshold: 10_000,
            swift_staged_threshold: 50_000,
            sepa_tiers: [(1_000, 5), (10_000, 15), (50_000, 35)],
            sepa_top_fee: 60,
            sepa_urgent_surcharge: 25,
            swift_base_fee: 30,
            swift_urgent_surcharge: 50,
            swift_processing_rate_bps: 10,
            swift_processing_cap: 150,
            swift_correspondent_fee: 40,
        }
    }
}

/// One partial payment within a transfer
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Tranche {
    pub description: String,
    pub amount: i64,
}

/// Fee structure of a planned transfer
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub base: i64,
    pub urgent: i64,
    pub processing: i64,
    pub correspondent: i64,
    pub total: i64,
}

/// Result of planning a disbursement
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DisbursementPlan {
    pub tranches: Vec<Tranche>,
    pub fees: FeeBreakdown,
}

impl DisbursementPlan {
    /// Number of validation codes a transfer following this plan requires
    pub fn required_codes(&self) -> i32 {
        self.tranches.len() as i32
    }
}

/// Compute the tranche breakdown and fee structure for a transfer.
pub fn plan(
    amount: i64,
    network: NetworkType,
    urgent: bool,
    cost_allocation: CostAllocation,
    policy: &FeePolicy,
) -> DisbursementPlan {
    let fees = compute_fees(amount, network, urgent, cost_allocation, policy);

    let tranches = if network == NetworkType::Swift && amount > policy.swift_staged_threshold {
        // Large international transfers: fees up front, then 40/30/30.
        let first = amount * 40 / 100;
        let second = amount * 30 / 100;
        // Last tranche absorbs integer-division remainder.
        let third = amount - first - second;
        vec![
            Tranche {
                description: "Processing fees".to_string(),
                amount: fees.total,
            },
            Tranche {
                description: "Tranche 1 of 3 (40%)".to_string(),
                amount: first,
            },
            Tranche {
                description: "Tranche 2 of 3 (30%)".to_string(),
                amount: second,
            },
            Tranche {
                description: "Tranche 3 of 3 (30%)".to_string(),
                amount: third,
            },
        ]
    } else if amount > policy.staged_threshold {
        let first = amount / 2;
        vec![
            Tranche {
                description: "Processing fees".to_string(),
                amount: fees.total,
            },
            Tranche {
                description: "Tranche 1 of 2 (50%)".to_string(),
                amount: first,
            },
            Tranche {
                description: "Tranche 2 of 2 (50%)".to_string(),
                amount: amount - first,
            },
        ]
    } else {
        vec![Tranche {
            description: "Full disbursement".to_string(),
            amount: amount + fees.total,
        }]
    };

    DisbursementPlan { tranches, fees }
}

fn compute_fees(
    amount: i64,
    network: NetworkType,
    urgent: bool,
    cost_allocation: CostAllocation,
    policy: &FeePolicy,
) -> FeeBreakdown {
    match network {
        NetworkType::Sepa => {
            let base = sepa_base_fee(amount, policy);
            let urgent_fee = if urgent { policy.sepa_urgent_surcharge } else { 0 };
            FeeBreakdown {
                base,
                urgent: urgent_fee,
                processing: 0,
                correspondent: 0,
                total: base + urgent_fee,
            }
        }
        NetworkType::Swift => {
            let base = policy.swift_base_fee;
            let urgent_fee = if urgent { policy.swift_urgent_surcharge } else { 0 };
            let processing = processing_fee(amount, policy);
            let correspondent = match cost_allocation {
                CostAllocation::Our => policy.swift_correspondent_fee,
                CostAllocation::Shared => 0,
            };
            FeeBreakdown {
                base,
                urgent: urgent_fee,
                processing,
                correspondent,
                total: base + urgent_fee + processing + correspondent,
            }
        }
    }
}

fn sepa_base_fee(amount: i64, policy: &FeePolicy) -> i64 {
    for (ceiling, fee) in policy.sepa_tiers {
        if amount <= ceiling {
            return fee;
        }
    }
    policy.sepa_top_fee
}

/// Proportional SWIFT processing fee, capped by policy.
/// Uses i128 intermediate to avoid overflow on large amounts.
fn processing_fee(amount: i64, policy: &FeePolicy) -> i64 {
    let raw = (amount as i128 * policy.swift_processing_rate_bps as i128) / 10_000;
    (raw as i64).min(policy.swift_processing_cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FeePolicy {
        FeePolicy::default()
    }

    #[test]
    fn test_small_sepa_single_tranche() {
        let p = plan(5_000, NetworkType::Sepa, false, CostAllocation::Shared, &policy());
        assert_eq!(p.tranches.len(), 1);
        // Principal plus total fees, combined
        assert_eq!(p.tranches[0].amount, 5_000 + p.fees.total);
        assert_eq!(p.fees.processing, 0);
        assert_eq!(p.fees.correspondent, 0);
        assert_eq!(p.required_codes(), 1);
    }

    #[test]
    fn test_mid_sepa_three_tranches() {
        let p = plan(15_000, NetworkType::Sepa, false, CostAllocation::Shared, &policy());
        assert_eq!(p.tranches.len(), 3);
        assert_eq!(p.tranches[0].amount, p.fees.total);
        assert_eq!(p.tranches[1].amount, 7_500);
        assert_eq!(p.tranches[2].amount, 7_500);
    }

    #[test]
    fn test_large_swift_four_tranches() {
        let p = plan(60_000, NetworkType::Swift, false, CostAllocation::Shared, &policy());
        assert_eq!(p.tranches.len(), 4);
        assert_eq!(p.tranches[0].amount, p.fees.total);
        assert_eq!(p.tranches[1].amount, 24_000);
        assert_eq!(p.tranches[2].amount, 18_000);
        assert_eq!(p.tranches[3].amount, 18_000);
        assert_eq!(p.required_codes(), 4);
    }

    #[test]
    fn test_large_sepa_stays_three_tranches() {
        // The four-way split is SWIFT-only
        let p = plan(60_000, NetworkType::Sepa, false, CostAllocation::Shared, &policy());
        assert_eq!(p.tranches.len(), 3);
        assert_eq!(p.tranches[1].amount, 30_000);
        assert_eq!(p.tranches[2].amount, 30_000);
    }

    #[test]
    fn test_odd_amount_remainder_goes_to_last_tranche() {
        let p = plan(60_001, NetworkType::Swift, false, CostAllocation::Shared, &policy());
        let principal: i64 = p.tranches[1..].iter().map(|t| t.amount).sum();
        assert_eq!(principal, 60_001);

        let p = plan(10_001, NetworkType::Sepa, false, CostAllocation::Shared, &policy());
        assert_eq!(p.tranches[1].amount + p.tranches[2].amount, 10_001);
    }

    #[test]
    fn test_sepa_fee_tiers() {
        let pol = policy();
        assert_eq!(sepa_base_fee(500, &pol), 5);
        assert_eq!(sepa_base_fee(1_000, &pol), 5);
        assert_eq!(sepa_base_fee(9_000, &pol), 15);
        assert_eq!(sepa_base_fee(20_000, &pol), 35);
        assert_eq!(sepa_base_fee(80_000, &pol), 60);
    }

    #[test]
    fn test_sepa_urgent_surcharge() {
        let pol = policy();
        let calm = plan(5_000, NetworkType::Sepa, false, CostAllocation::Shared, &pol);
        let urgent = plan(5_000, NetworkType::Sepa, true, CostAllocation::Shared, &pol);
        assert_eq!(urgent.fees.total - calm.fees.total, pol.sepa_urgent_surcharge);
    }

    #[test]
    fn test_swift_processing_fee_capped() {
        let pol = policy();
        // 0.10% of 100_000 = 100, under the cap
        assert_eq!(processing_fee(100_000, &pol), 100);
        // 0.10% of 10_000_000 = 10_000, capped at 150
        assert_eq!(processing_fee(10_000_000, &pol), 150);
    }

    #[test]
    fn test_swift_correspondent_fee_only_for_our() {
        let pol = policy();
        let sha = plan(60_000, NetworkType::Swift, false, CostAllocation::Shared, &pol);
        let our = plan(60_000, NetworkType::Swift, false, CostAllocation::Our, &pol);
        assert_eq!(sha.fees.correspondent, 0);
        assert_eq!(our.fees.correspondent, pol.swift_correspondent_fee);
        assert_eq!(our.fees.total - sha.fees.total, pol.swift_correspondent_fee);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let pol = policy();
        let a = plan(5_000, NetworkType::Sepa, false, CostAllocation::Shared, &pol);
        let b = plan(5_000, NetworkType::Sepa, false, CostAllocation::Shared, &pol);
        assert_eq!(a, b);
    }
}
