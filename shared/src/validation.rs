//! Validation utilities for fulfillment requests
//!
//! These run at the boundary, before any aggregate is loaded: the pure
//! resolvers and planners assume their input has already passed here.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::fulfillment::LineRequest;

/// Validate requested order lines: non-empty, positive quantities, no
/// duplicate variants, non-negative prices.
pub fn validate_line_requests(lines: &[LineRequest]) -> Result<(), &'static str> {
    if lines.is_empty() {
        return Err("An order requires at least one line");
    }
    for line in lines {
        if line.quantity <= 0 {
            return Err("Line quantity must be positive");
        }
    }
    let mut seen: Vec<Uuid> = Vec::with_capacity(lines.len());
    for line in lines {
        if seen.contains(&line.variant_id) {
            return Err("Duplicate variant in order lines");
        }
        seen.push(line.variant_id);
    }
    Ok(())
}

/// Validate a unit price / discount pair
pub fn validate_pricing(price: Decimal, discount: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Price cannot be negative");
    }
    if discount < Decimal::ZERO {
        return Err("Discount cannot be negative");
    }
    if discount > price {
        return Err("Discount cannot exceed price");
    }
    Ok(())
}

/// Validate a scanned-units count against the ordered quantity
pub fn validate_picked_quantity(picked: i64, ordered: i64) -> Result<(), &'static str> {
    if picked < 0 {
        return Err("Picked quantity cannot be negative");
    }
    if picked > ordered {
        return Err("Picked quantity cannot exceed ordered quantity");
    }
    Ok(())
}

/// Validate an instalment schedule: non-empty, positive amounts, ascending
/// due dates.
pub fn validate_instalments(schedule: &[crate::models::Instalment]) -> Result<(), &'static str> {
    if schedule.is_empty() {
        return Err("Instalment schedule cannot be empty");
    }
    for inst in schedule {
        if inst.amount <= Decimal::ZERO {
            return Err("Instalment amounts must be positive");
        }
    }
    for pair in schedule.windows(2) {
        if pair[1].due_date < pair[0].due_date {
            return Err("Instalment due dates must be ascending");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn line(quantity: i64) -> LineRequest {
        LineRequest {
            variant_id: Uuid::new_v4(),
            quantity,
        }
    }

    #[test]
    fn rejects_empty_lines() {
        assert!(validate_line_requests(&[]).is_err());
    }

    #[test]
    fn rejects_zero_quantity() {
        assert!(validate_line_requests(&[line(0)]).is_err());
        assert!(validate_line_requests(&[line(-3)]).is_err());
        assert!(validate_line_requests(&[line(1)]).is_ok());
    }

    #[test]
    fn rejects_duplicate_variants() {
        let a = line(2);
        let dup = LineRequest {
            variant_id: a.variant_id,
            quantity: 1,
        };
        assert!(validate_line_requests(&[a, dup]).is_err());
    }

    #[test]
    fn rejects_discount_above_price() {
        assert!(validate_pricing(Decimal::new(100, 0), Decimal::new(101, 0)).is_err());
        assert!(validate_pricing(Decimal::new(100, 0), Decimal::new(100, 0)).is_ok());
    }

    #[test]
    fn rejects_overpicking() {
        assert!(validate_picked_quantity(6, 5).is_err());
        assert!(validate_picked_quantity(5, 5).is_ok());
        assert!(validate_picked_quantity(-1, 5).is_err());
    }
}
