//! Availability resolution over a ledger snapshot

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One requested (variant, quantity) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub variant_id: Uuid,
    pub quantity: i64,
}

/// Per-line shortfall after resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineShortfall {
    pub variant_id: Uuid,
    pub requested: i64,
    pub available: i64,
    pub missing: i64,
}

/// Aggregate availability classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    /// Every requested unit is available at the target storage point
    All,
    /// Some requested units are available, some are missing
    #[serde(rename = "some")]
    Partial,
    /// Every requested unit is missing
    None,
}

impl AvailabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityStatus::All => "all",
            AvailabilityStatus::Partial => "some",
            AvailabilityStatus::None => "none",
        }
    }
}

/// Result of resolving a set of lines against one storage point's ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub status: AvailabilityStatus,
    /// Lines with missing > 0, in request order
    pub shortfalls: Vec<LineShortfall>,
}

impl AvailabilityReport {
    pub fn missing_total(&self) -> i64 {
        self.shortfalls.iter().map(|s| s.missing).sum()
    }
}

/// Classify overall availability of `lines` against `snapshot`, the
/// `available`-bucket counts per variant at the target storage point.
///
/// Pure over the snapshot: callers must take it and commit under the same
/// transaction/lock or treat the result as advisory. Zero-quantity lines are
/// rejected upstream (`validate_line_requests`) and never reach this
/// resolver.
pub fn resolve_availability(
    lines: &[LineRequest],
    snapshot: &HashMap<Uuid, i64>,
) -> AvailabilityReport {
    let mut shortfalls = Vec::new();
    let mut any_served = false;

    for line in lines {
        let available = snapshot.get(&line.variant_id).copied().unwrap_or(0).max(0);
        let served = available.min(line.quantity);
        if served > 0 {
            any_served = true;
        }
        let missing = line.quantity - served;
        if missing > 0 {
            shortfalls.push(LineShortfall {
                variant_id: line.variant_id,
                requested: line.quantity,
                available,
                missing,
            });
        }
    }

    let status = if shortfalls.is_empty() {
        AvailabilityStatus::All
    } else if any_served {
        AvailabilityStatus::Partial
    } else {
        AvailabilityStatus::None
    };

    AvailabilityReport { status, shortfalls }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: &[(Uuid, i64)]) -> HashMap<Uuid, i64> {
        entries.iter().copied().collect()
    }

    #[test]
    fn all_available_yields_no_shortfall() {
        let v = Uuid::new_v4();
        let report = resolve_availability(
            &[LineRequest {
                variant_id: v,
                quantity: 5,
            }],
            &snapshot(&[(v, 5)]),
        );
        assert_eq!(report.status, AvailabilityStatus::All);
        assert!(report.shortfalls.is_empty());
    }

    #[test]
    fn partial_coverage_is_some() {
        let v = Uuid::new_v4();
        let report = resolve_availability(
            &[LineRequest {
                variant_id: v,
                quantity: 5,
            }],
            &snapshot(&[(v, 2)]),
        );
        assert_eq!(report.status, AvailabilityStatus::Partial);
        assert_eq!(report.shortfalls.len(), 1);
        assert_eq!(report.shortfalls[0].missing, 3);
        assert_eq!(report.shortfalls[0].available, 2);
    }

    #[test]
    fn unknown_variant_is_none() {
        let v = Uuid::new_v4();
        let report = resolve_availability(
            &[LineRequest {
                variant_id: v,
                quantity: 3,
            }],
            &snapshot(&[]),
        );
        assert_eq!(report.status, AvailabilityStatus::None);
        assert_eq!(report.missing_total(), 3);
    }

    #[test]
    fn mixed_lines_classify_as_some() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let report = resolve_availability(
            &[
                LineRequest {
                    variant_id: a,
                    quantity: 2,
                },
                LineRequest {
                    variant_id: b,
                    quantity: 4,
                },
            ],
            &snapshot(&[(a, 2), (b, 0)]),
        );
        assert_eq!(report.status, AvailabilityStatus::Partial);
        assert_eq!(report.shortfalls.len(), 1);
        assert_eq!(report.shortfalls[0].variant_id, b);
    }

    #[test]
    fn resolution_is_pure() {
        let v = Uuid::new_v4();
        let lines = [LineRequest {
            variant_id: v,
            quantity: 7,
        }];
        let snap = snapshot(&[(v, 3)]);
        assert_eq!(
            resolve_availability(&lines, &snap),
            resolve_availability(&lines, &snap)
        );
    }
}
