use rust_decimal::Decimal;

/// The number of decimal places tracked for every monetary amount.
///
/// Mirrors the teacher crate's `DECIMAL_SCALE`: amounts are always
/// normalized to this scale, and no rounding is ever performed against it —
/// `rescale` truncates, it never rounds, which is why every caller is
/// expected to already be supplying a scale-2 amount (spec §4.1 step 3).
pub const MONEY_SCALE: u32 = 2;

/// Rescales `amount` to [`MONEY_SCALE`] in place.
pub fn normalize(mut amount: Decimal) -> Decimal {
    amount.rescale(MONEY_SCALE);
    amount
}

/// Returns whether `amount` is already at [`MONEY_SCALE`] or coarser, i.e.
/// rescaling it to [`MONEY_SCALE`] would not discard any precision.
///
/// Used to reject deltas with a finer scale than cents, per spec §4.1's
/// `INVALID_DELTA` error ("delta with wrong scale is rejected").
#[must_use]
pub fn has_valid_scale(amount: Decimal) -> bool {
    let mut rescaled = amount;
    rescaled.rescale(MONEY_SCALE);
    rescaled == amount
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn accepts_scale_two_and_coarser() {
        assert!(has_valid_scale(dec!(10.00)));
        assert!(has_valid_scale(dec!(10.5)));
        assert!(has_valid_scale(dec!(10)));
    }

    #[test]
    fn rejects_finer_than_cents() {
        assert!(!has_valid_scale(dec!(10.005)));
        assert!(!has_valid_scale(dec!(0.001)));
    }

    #[test]
    fn normalize_rescales_to_two_places() {
        assert_eq!(normalize(dec!(10)).scale(), 2);
    }
}
