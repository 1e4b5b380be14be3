//! Partial-fulfillment split: apportioning an order's lines between the
//! validated parent and the child carrying the unfulfilled remainder

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::ArticleOrdered;

/// How one line splits between parent and child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSplit {
    pub line_id: Uuid,
    pub variant_id: Uuid,
    pub parent_quantity: i64,
    pub child_quantity: i64,
    pub parent_total: Decimal,
    pub child_total: Decimal,
}

/// Complete apportioning of an order for partial validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSplit {
    pub lines: Vec<LineSplit>,
    pub parent_total: Decimal,
    pub child_total: Decimal,
}

impl OrderSplit {
    /// Lines the child order receives (child_quantity > 0)
    pub fn child_lines(&self) -> impl Iterator<Item = &LineSplit> {
        self.lines.iter().filter(|l| l.child_quantity > 0)
    }

    /// True when nothing remains for a child: the order validated in full
    pub fn is_complete(&self) -> bool {
        self.lines.iter().all(|l| l.child_quantity == 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("picked quantity {picked} exceeds ordered quantity {ordered} on line {line_id}")]
    OverPicked {
        line_id: Uuid,
        picked: i64,
        ordered: i64,
    },
    #[error("picked quantities reference unknown line {0}")]
    UnknownLine(Uuid),
    #[error("no units picked; nothing to validate")]
    NothingPicked,
}

/// Apportion `lines` between parent and child given per-line picked counts.
///
/// Unlisted lines count as fully unpicked. Quantities split exactly, and
/// because both sides reprice at the line's net unit price,
/// `parent_total + child_total` always equals the original order total.
pub fn split_order(
    lines: &[ArticleOrdered],
    picked: &[(Uuid, i64)],
) -> Result<OrderSplit, SplitError> {
    for (line_id, _) in picked {
        if !lines.iter().any(|l| l.id == *line_id) {
            return Err(SplitError::UnknownLine(*line_id));
        }
    }

    let mut splits = Vec::with_capacity(lines.len());
    let mut parent_total = Decimal::ZERO;
    let mut child_total = Decimal::ZERO;
    let mut any_picked = false;

    for line in lines {
        let picked_qty = picked
            .iter()
            .find(|(id, _)| *id == line.id)
            .map(|(_, qty)| *qty)
            .unwrap_or(0);

        if picked_qty < 0 || picked_qty > line.quantity {
            return Err(SplitError::OverPicked {
                line_id: line.id,
                picked: picked_qty,
                ordered: line.quantity,
            });
        }
        if picked_qty > 0 {
            any_picked = true;
        }

        let split = LineSplit {
            line_id: line.id,
            variant_id: line.variant_id,
            parent_quantity: picked_qty,
            child_quantity: line.quantity - picked_qty,
            parent_total: line.total_for(picked_qty),
            child_total: line.total_for(line.quantity - picked_qty),
        };
        parent_total += split.parent_total;
        child_total += split.child_total;
        splits.push(split);
    }

    if !any_picked {
        return Err(SplitError::NothingPicked);
    }

    Ok(OrderSplit {
        lines: splits,
        parent_total,
        child_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleStatus;
    use chrono::Utc;

    fn article(quantity: i64, price: i64, discount: i64) -> ArticleOrdered {
        ArticleOrdered {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            quantity,
            picked_quantity: 0,
            price: Decimal::new(price, 2),
            discount: Decimal::new(discount, 2),
            status: ArticleStatus::ToPickPack,
            position: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn totals_sum_to_original() {
        let lines = vec![article(5, 1999, 100), article(2, 4550, 0)];
        let original: Decimal = lines.iter().map(|l| l.line_total()).sum();
        let split = split_order(&lines, &[(lines[0].id, 3), (lines[1].id, 1)]).unwrap();
        assert_eq!(split.parent_total + split.child_total, original);
        assert_eq!(split.lines[0].parent_quantity, 3);
        assert_eq!(split.lines[0].child_quantity, 2);
    }

    #[test]
    fn full_pick_leaves_no_child() {
        let lines = vec![article(4, 1000, 0)];
        let split = split_order(&lines, &[(lines[0].id, 4)]).unwrap();
        assert!(split.is_complete());
        assert_eq!(split.child_total, Decimal::ZERO);
    }

    #[test]
    fn unlisted_line_goes_fully_to_child() {
        let lines = vec![article(3, 500, 0), article(2, 700, 0)];
        let split = split_order(&lines, &[(lines[0].id, 3)]).unwrap();
        assert_eq!(split.lines[1].child_quantity, 2);
        assert_eq!(split.child_lines().count(), 1);
    }

    #[test]
    fn overpick_is_rejected() {
        let lines = vec![article(2, 500, 0)];
        let err = split_order(&lines, &[(lines[0].id, 3)]).unwrap_err();
        assert!(matches!(err, SplitError::OverPicked { .. }));
    }

    #[test]
    fn nothing_picked_is_rejected() {
        let lines = vec![article(2, 500, 0)];
        assert_eq!(split_order(&lines, &[]).unwrap_err(), SplitError::NothingPicked);
    }

    #[test]
    fn unknown_line_is_rejected() {
        let lines = vec![article(2, 500, 0)];
        let ghost = Uuid::new_v4();
        assert_eq!(
            split_order(&lines, &[(ghost, 1)]).unwrap_err(),
            SplitError::UnknownLine(ghost)
        );
    }
}
