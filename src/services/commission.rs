//! Commission arithmetic for card bookings.
//!
//! All money moves in integer minor units. The platform fee rounds down and
//! the instructor payout comes from subtraction, so the two halves always
//! reconstruct the gross amount exactly.

use std::collections::HashMap;

use uuid::Uuid;

use crate::config::settings::CommissionConfig;
use crate::error::{AppError, AppResult};

/// Basis points in a whole.
const BPS_DENOMINATOR: i128 = 10_000;

/// Fee and payout halves of one gross amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionSplit {
    pub fee_cents: i64,
    pub payout_cents: i64,
}

/// A single commission rate in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionPolicy {
    rate_bps: u32,
}

impl CommissionPolicy {
    pub fn new(rate_bps: u32) -> AppResult<Self> {
        if rate_bps > BPS_DENOMINATOR as u32 {
            return Err(AppError::Validation {
                field: "rate_bps".to_string(),
                reason: format!("commission rate {} exceeds 10000 basis points", rate_bps),
            });
        }
        Ok(Self { rate_bps })
    }

    pub fn rate_bps(&self) -> u32 {
        self.rate_bps
    }

    /// Splits `gross_cents` into fee (rounded down) and payout (remainder).
    pub fn split(&self, gross_cents: i64) -> CommissionSplit {
        let fee = (gross_cents as i128 * self.rate_bps as i128 / BPS_DENOMINATOR) as i64;
        CommissionSplit {
            fee_cents: fee,
            payout_cents: gross_cents - fee,
        }
    }
}

/// Resolves the commission rate for an instructor: per-instructor overrides
/// first, the platform default otherwise.
#[derive(Debug, Clone)]
pub struct CommissionSchedule {
    default_policy: CommissionPolicy,
    overrides: HashMap<Uuid, CommissionPolicy>,
}

impl CommissionSchedule {
    pub fn from_config(config: &CommissionConfig) -> AppResult<Self> {
        let default_policy = CommissionPolicy::new(config.default_rate_bps)?;
        let mut overrides = HashMap::with_capacity(config.overrides.len());
        for entry in &config.overrides {
            overrides.insert(entry.instructor_id, CommissionPolicy::new(entry.rate_bps)?);
        }
        Ok(Self {
            default_policy,
            overrides,
        })
    }

    pub fn policy_for(&self, instructor_id: Uuid) -> CommissionPolicy {
        self.overrides
            .get(&instructor_id)
            .copied()
            .unwrap_or(self.default_policy)
    }
}

/// Proportional reversal of an earlier split when `refunded_cents` of
/// `gross_cents` comes back.
///
/// The reversed fee is `fee × refunded / gross` rounded half-up; the payout
/// reversal is the remainder. A full refund therefore reverses fee and
/// payout exactly.
pub fn reversal_split(fee_cents: i64, gross_cents: i64, refunded_cents: i64) -> CommissionSplit {
    if gross_cents <= 0 || refunded_cents <= 0 {
        return CommissionSplit {
            fee_cents: 0,
            payout_cents: refunded_cents.max(0),
        };
    }
    let numerator = fee_cents as i128 * refunded_cents as i128;
    let denominator = gross_cents as i128;
    let reversed_fee = ((numerator + denominator / 2) / denominator) as i64;
    CommissionSplit {
        fee_cents: reversed_fee,
        payout_cents: refunded_cents - reversed_fee,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_rate_splits_example_amount() {
        let policy = CommissionPolicy::new(1500).unwrap();
        let split = policy.split(10_000);
        assert_eq!(split.fee_cents, 1500);
        assert_eq!(split.payout_cents, 8500);
    }

    #[test]
    fn split_handles_boundary_amounts() {
        let policy = CommissionPolicy::new(1500).unwrap();
        for gross in [0, 1, 999_999] {
            let split = policy.split(gross);
            assert_eq!(split.fee_cents + split.payout_cents, gross);
            assert!(split.fee_cents >= 0);
            assert!(split.payout_cents >= 0);
        }
        assert_eq!(policy.split(1).fee_cents, 0);
    }

    #[test]
    fn rate_above_whole_is_rejected() {
        assert!(CommissionPolicy::new(10_001).is_err());
        assert!(CommissionPolicy::new(10_000).is_ok());
    }

    #[test]
    fn full_refund_reverses_both_halves_exactly() {
        let policy = CommissionPolicy::new(1500).unwrap();
        let split = policy.split(10_000);
        let reversed = reversal_split(split.fee_cents, 10_000, 10_000);
        assert_eq!(reversed.fee_cents, split.fee_cents);
        assert_eq!(reversed.payout_cents, split.payout_cents);
    }

    #[test]
    fn partial_refund_rounds_fee_half_up() {
        // fee 1500 of 10000; refunding 3333 reverses 499.95 -> 500.
        let reversed = reversal_split(1500, 10_000, 3333);
        assert_eq!(reversed.fee_cents, 500);
        assert_eq!(reversed.payout_cents, 2833);
    }

    #[test]
    fn schedule_prefers_override() {
        let instructor = Uuid::new_v4();
        let config = CommissionConfig {
            default_rate_bps: 1500,
            overrides: vec![crate::config::settings::CommissionOverride {
                instructor_id: instructor,
                rate_bps: 1000,
            }],
        };
        let schedule = CommissionSchedule::from_config(&config).unwrap();
        assert_eq!(schedule.policy_for(instructor).rate_bps(), 1000);
        assert_eq!(schedule.policy_for(Uuid::new_v4()).rate_bps(), 1500);
    }

    proptest! {
        #[test]
        fn split_sum_invariant(gross in 0i64..10_000_000, rate in 0u32..=10_000) {
            let policy = CommissionPolicy::new(rate).unwrap();
            let split = policy.split(gross);
            prop_assert_eq!(split.fee_cents + split.payout_cents, gross);
            prop_assert!(split.fee_cents >= 0);
            prop_assert!(split.payout_cents >= 0);
        }

        #[test]
        fn reversal_never_exceeds_refund(
            gross in 1i64..10_000_000,
            rate in 0u32..=10_000,
            fraction in 0.0f64..=1.0,
        ) {
            let policy = CommissionPolicy::new(rate).unwrap();
            let split = policy.split(gross);
            let refunded = ((gross as f64) * fraction) as i64;
            let reversed = reversal_split(split.fee_cents, gross, refunded);
            prop_assert_eq!(reversed.fee_cents + reversed.payout_cents, refunded.max(0));
            prop_assert!(reversed.fee_cents <= split.fee_cents + 1);
        }
    }
}
