//! Line and version totals. Pure functions, no currency conversion.
use crate::error::PricingError;
use crate::types::Amount;
use rust_decimal::Decimal;

/// Minor-unit precision of every stored total.
pub const CURRENCY_SCALE: u32 = 2;

/// Anything that carries a quantity and a unit price.
pub trait PricedLine {
    fn quantity(&self) -> i64;
    fn unit_price(&self) -> Amount;
}

impl PricedLine for (i64, Amount) {
    fn quantity(&self) -> i64 {
        self.0
    }
    fn unit_price(&self) -> Amount {
        self.1
    }
}

/// `quantity × unit_price`, rounded to two decimals.
pub fn line_total(quantity: i64, unit_price: Amount) -> Result<Amount, PricingError> {
    if quantity < 0 {
        return Err(PricingError::NegativeQuantity(quantity));
    }
    if quantity == 0 {
        return Err(PricingError::ZeroQuantity);
    }
    if unit_price.is_negative() {
        return Err(PricingError::NegativeUnitPrice(unit_price.value()));
    }

    let total = Decimal::from(quantity)
        .checked_mul(unit_price.value())
        .ok_or(PricingError::Overflow)?;

    Ok(Amount::new(total).round_to(CURRENCY_SCALE))
}

/// Sum of the rounded line totals. An empty slice totals zero.
pub fn version_total<L: PricedLine>(lines: &[L]) -> Result<Amount, PricingError> {
    lines.iter().try_fold(Amount::ZERO, |acc, line| {
        let total = line_total(line.quantity(), line.unit_price())?;
        acc.value()
            .checked_add(total.value())
            .map(Amount::new)
            .ok_or(PricingError::Overflow)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_total_multiplies_and_rounds() {
        assert_eq!(
            line_total(5, Amount::from_minor(1000)).unwrap(),
            Amount::from_minor(5000)
        );
        // 3 × 0.3333 = 0.9999 -> 1.00
        let price = Amount::new(Decimal::new(3333, 4));
        assert_eq!(line_total(3, price).unwrap(), Amount::from_minor(100));
    }

    #[test]
    fn free_lines_are_allowed() {
        assert_eq!(line_total(7, Amount::ZERO).unwrap(), Amount::ZERO);
    }

    #[test]
    fn rejects_negative_and_zero_inputs() {
        assert_eq!(
            line_total(-1, Amount::from_minor(100)),
            Err(PricingError::NegativeQuantity(-1))
        );
        assert_eq!(
            line_total(0, Amount::from_minor(100)),
            Err(PricingError::ZeroQuantity)
        );
        assert!(matches!(
            line_total(1, Amount::from_minor(-1)),
            Err(PricingError::NegativeUnitPrice(_))
        ));
    }

    #[test]
    fn version_total_sums_rounded_lines() {
        let third = Amount::new(Decimal::new(3335, 4)); // 0.3335
        // each line: 1 × 0.3335 -> 0.33 ; sum of rounded lines = 0.99
        let lines = vec![(1i64, third), (1, third), (1, third)];
        assert_eq!(version_total(&lines).unwrap(), Amount::from_minor(99));
    }

    #[test]
    fn version_total_propagates_line_errors() {
        let lines = vec![(2i64, Amount::from_minor(100)), (-3, Amount::from_minor(100))];
        assert_eq!(
            version_total(&lines),
            Err(PricingError::NegativeQuantity(-3))
        );
    }
}
