//! Proportional share computation.
//!
//! Every recipient but the last receives `floor(amount * weight / 100)`.
//! The last recipient receives whatever remains, so the shares always sum
//! to exactly `amount` and truncation never loses or creates value.

use splitvault_types::{MAX_TRANSFER_AMOUNT, PERCENT_TOTAL};

use crate::{LedgerError, Result};

/// Validate a weight vector: non-empty and summing to [`PERCENT_TOTAL`].
///
/// # Errors
///
/// - [`LedgerError::Validation`] if `weights` is empty or does not sum to 100
pub fn validate_weights(weights: &[u8]) -> Result<()> {
    if weights.is_empty() {
        return Err(LedgerError::Validation(
            "at least one weight is required".to_string(),
        ));
    }
    let total: u32 = weights.iter().map(|w| u32::from(*w)).sum();
    if total != u32::from(PERCENT_TOTAL) {
        return Err(LedgerError::Validation(format!(
            "weights must sum to {PERCENT_TOTAL}, got {total}"
        )));
    }
    Ok(())
}

/// Split `amount` across `weights`.
///
/// Returns one share per weight, in order.
///
/// # Errors
///
/// - [`LedgerError::Overflow`] if `amount` exceeds [`MAX_TRANSFER_AMOUNT`]
/// - [`LedgerError::Validation`] if the weights are invalid
pub fn compute_shares(weights: &[u8], amount: u64) -> Result<Vec<u64>> {
    if amount > MAX_TRANSFER_AMOUNT {
        return Err(LedgerError::Overflow);
    }
    validate_weights(weights)?;

    let last = weights.len() - 1;
    let mut shares = Vec::with_capacity(weights.len());
    let mut running_total: u64 = 0;

    for weight in &weights[..last] {
        // amount <= i64::MAX and weight <= 255, so the product fits in u128.
        let share = (u128::from(amount) * u128::from(*weight) / u128::from(PERCENT_TOTAL)) as u64;
        running_total = running_total
            .checked_add(share)
            .ok_or(LedgerError::Overflow)?;
        shares.push(share);
    }

    let remainder = amount.checked_sub(running_total).ok_or_else(|| {
        LedgerError::InternalConsistency(format!(
            "partial shares {running_total} exceed amount {amount}"
        ))
    })?;
    shares.push(remainder);

    Ok(shares)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_sixty_forty() {
        let shares = compute_shares(&[60, 40], 1000).expect("shares");
        assert_eq!(shares, vec![600, 400]);
    }

    #[test]
    fn test_remainder_goes_to_last() {
        // 33% of 100 = 33 twice, last gets 34.
        let shares = compute_shares(&[33, 33, 34], 100).expect("shares");
        assert_eq!(shares, vec![33, 33, 34]);

        // 1 unit: both truncated shares are 0, last takes it.
        let shares = compute_shares(&[33, 33, 34], 1).expect("shares");
        assert_eq!(shares, vec![0, 0, 1]);
    }

    #[test]
    fn test_single_recipient_takes_all() {
        assert_eq!(compute_shares(&[100], 12_345).expect("shares"), vec![12_345]);
    }

    #[test]
    fn test_zero_weight_recipient() {
        let shares = compute_shares(&[0, 100, 0], 999).expect("shares");
        assert_eq!(shares, vec![0, 999, 0]);
    }

    #[test]
    fn test_max_amount_does_not_overflow() {
        let shares = compute_shares(&[50, 25, 25], MAX_TRANSFER_AMOUNT).expect("shares");
        assert_eq!(shares.iter().sum::<u64>(), MAX_TRANSFER_AMOUNT);
    }

    #[test]
    fn test_amount_above_rail_bound_rejected() {
        assert_eq!(
            compute_shares(&[100], MAX_TRANSFER_AMOUNT + 1),
            Err(LedgerError::Overflow)
        );
    }

    #[test]
    fn test_invalid_weights_rejected() {
        assert!(matches!(
            compute_shares(&[50, 30], 100),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            compute_shares(&[], 100),
            Err(LedgerError::Validation(_))
        ));
        // 200 + 200 wraps in u8 arithmetic; must be summed wide.
        assert!(validate_weights(&[200, 200, 0]).is_err());
    }

    #[test]
    fn test_random_weights_sum_exactly() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let count = rng.gen_range(1..=20usize);
            let mut weights = vec![0u8; count];
            let mut remaining = 100u8;
            for w in weights.iter_mut().take(count - 1) {
                let pick = rng.gen_range(0..=remaining);
                *w = pick;
                remaining -= pick;
            }
            weights[count - 1] = remaining;

            let amount = rng.gen_range(0..=MAX_TRANSFER_AMOUNT);
            let shares = compute_shares(&weights, amount).expect("shares");
            assert_eq!(shares.len(), count);
            let total: u128 = shares.iter().map(|s| u128::from(*s)).sum();
            assert_eq!(total, u128::from(amount), "weights {weights:?}");
        }
    }
}
