//! Boundary to the external currency converter. Converted values are for display only and
//! are never written back to the ledger.
use crate::types::Amount;

pub trait CurrencyConverter {
    /// `None` when no rate is known for the pair.
    fn convert(&self, amount: Amount, from: &str, to: &str) -> Option<Amount>;
}

impl<F> CurrencyConverter for F
where
    F: Fn(Amount, &str, &str) -> Option<Amount>,
{
    fn convert(&self, amount: Amount, from: &str, to: &str) -> Option<Amount> {
        self(amount, from, to)
    }
}

/// Passes amounts through unchanged when source and target match.
pub struct SameCurrencyOnly;

impl CurrencyConverter for SameCurrencyOnly {
    fn convert(&self, amount: Amount, from: &str, to: &str) -> Option<Amount> {
        from.eq_ignore_ascii_case(to).then_some(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_currency_passes_through() {
        let amount = Amount::from_minor(4200);
        assert_eq!(SameCurrencyOnly.convert(amount, "EUR", "eur"), Some(amount));
        assert_eq!(SameCurrencyOnly.convert(amount, "EUR", "USD"), None);
    }

    #[test]
    fn closures_are_converters() {
        let flat = |amount: Amount, _: &str, _: &str| Some(amount.round_to(0));
        assert_eq!(
            flat.convert(Amount::from_minor(1050), "EUR", "JPY"),
            Some(Amount::from_minor(1100))
        );
    }
}
