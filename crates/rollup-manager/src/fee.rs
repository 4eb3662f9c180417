//! Adaptive batch fee
//!
//! After every trustless verification the fee is re-tuned from how long the
//! newly verified batches waited. Walking the checkpoint list backwards from
//! the new tip, checkpoints sequenced after `now - verify_batch_time_target`
//! were verified within target. The first checkpoint at or before that
//! threshold ends the walk: it and everything down to the old tip waited
//! longer than target.
//!
//! ```text
//!   old tip                      threshold                     new tip
//!      |---- above target ----------|-------- below target -------|
//! ```
//!
//! More batches above target means provers are slow, so the fee goes up by
//! `multiplier^diff / 1000^diff`; otherwise it goes down by the same factor.
//! `diff` is capped at 12 and the result is clamped to
//! `[MIN_BATCH_FEE, MAX_BATCH_FEE]`.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RollupManagerError};
use crate::types::{Amount, BatchNum, RollupData, Timestamp};

/// 1 ether in base units
pub const ONE_ETHER: Amount = 1_000_000_000_000_000_000;

/// Lower fee bound (1 gwei)
pub const MIN_BATCH_FEE: Amount = 1_000_000_000;

/// Upper fee bound (1000 ether)
pub const MAX_BATCH_FEE: Amount = 1_000 * ONE_ETHER;

/// Cap on the exponent applied in one update
pub const MAX_BATCH_MULTIPLIER: u64 = 12;

/// Multiplier bounds, three decimals (1000 = 1.000)
pub const MIN_MULTIPLIER_BATCH_FEE: u16 = 1000;
pub const MAX_MULTIPLIER_BATCH_FEE: u16 = 1023;

/// Longest allowed verification time target (one day)
pub const MAX_VERIFY_BATCH_TIME_TARGET: u64 = 24 * 60 * 60;

/// Batch counts on each side of the time target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetSplit {
    /// Waited longer than target
    pub above: u64,
    /// Verified within target
    pub below: u64,
}

/// Walk the checkpoint list from `new_tip` down to `old_tip`
pub fn split_by_target(
    rollup: &RollupData,
    old_tip: BatchNum,
    new_tip: BatchNum,
    target_timestamp: Timestamp,
) -> TargetSplit {
    let total = new_tip.saturating_sub(old_tip);
    let mut above = 0;
    let mut current = new_tip;

    while current > old_tip {
        match rollup.sequenced_batches.get(&current) {
            Some(checkpoint) if checkpoint.sequenced_timestamp > target_timestamp => {
                current = checkpoint.previous_last_batch_sequenced;
            }
            _ => {
                above = current - old_tip;
                break;
            }
        }
    }

    TargetSplit {
        above,
        below: total - above,
    }
}

/// Fee after applying `split`, clamped into range
pub fn adjust_batch_fee(batch_fee: Amount, multiplier: u16, split: TargetSplit) -> Amount {
    let fee = BigUint::from(batch_fee);
    let one_ether = BigUint::from(ONE_ETHER);

    let new_fee = if split.below < split.above {
        let diff = (split.above - split.below).min(MAX_BATCH_MULTIPLIER) as u32;
        let factor_num = BigUint::from(multiplier).pow(diff);
        let factor_den = BigUint::from(1000u32).pow(diff);
        fee * factor_num / factor_den
    } else {
        let diff = (split.below - split.above).min(MAX_BATCH_MULTIPLIER) as u32;
        let acc_divisor =
            &one_ether * BigUint::from(multiplier).pow(diff) / BigUint::from(1000u32).pow(diff);
        if acc_divisor == BigUint::from(0u32) {
            fee
        } else {
            one_ether * fee / acc_divisor
        }
    };

    let new_fee = Amount::try_from(&new_fee).unwrap_or(Amount::MAX);
    new_fee.clamp(MIN_BATCH_FEE, MAX_BATCH_FEE)
}

/// Reward paid per newly verified batch
pub fn reward_per_batch(pool_balance: Amount, total_sequenced: u64, total_verified: u64) -> Amount {
    let outstanding = total_sequenced.saturating_sub(total_verified);
    if outstanding == 0 {
        return 0;
    }
    pool_balance / outstanding as Amount
}

/// Fee policy shared by every rollup
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeController {
    pub batch_fee: Amount,
    /// Three decimals, 1002 = 1.002
    pub multiplier_batch_fee: u16,
    /// Seconds a batch may wait for verification before counting as slow
    pub verify_batch_time_target: u64,
}

impl Default for FeeController {
    fn default() -> Self {
        Self {
            batch_fee: ONE_ETHER / 10,
            multiplier_batch_fee: 1002,
            verify_batch_time_target: 30 * 60,
        }
    }
}

impl FeeController {
    /// Re-tune after `rollup` advanced from `old_tip` to `new_tip`
    pub fn update(
        &mut self,
        rollup: &RollupData,
        old_tip: BatchNum,
        new_tip: BatchNum,
        now: Timestamp,
    ) -> TargetSplit {
        let target = now.saturating_sub(self.verify_batch_time_target);
        let split = split_by_target(rollup, old_tip, new_tip, target);
        let previous = self.batch_fee;
        self.batch_fee = adjust_batch_fee(self.batch_fee, self.multiplier_batch_fee, split);

        tracing::debug!(
            above = split.above,
            below = split.below,
            previous_fee = previous,
            batch_fee = self.batch_fee,
            "batch fee updated"
        );
        split
    }

    /// Fee charged for a forced batch
    pub fn forced_batch_fee(&self) -> Amount {
        self.batch_fee.saturating_mul(100)
    }

    pub fn validate_multiplier(multiplier: u16) -> Result<()> {
        if (MIN_MULTIPLIER_BATCH_FEE..=MAX_MULTIPLIER_BATCH_FEE).contains(&multiplier) {
            Ok(())
        } else {
            Err(RollupManagerError::InvalidMultiplierBatchFee(multiplier))
        }
    }

    pub fn validate_time_target(target: u64) -> Result<()> {
        if target > MAX_VERIFY_BATCH_TIME_TARGET {
            Err(RollupManagerError::InvalidVerifyBatchTimeTarget(target))
        } else {
            Ok(())
        }
    }

    pub fn validate_batch_fee(fee: Amount) -> Result<()> {
        if (MIN_BATCH_FEE..=MAX_BATCH_FEE).contains(&fee) {
            Ok(())
        } else {
            Err(RollupManagerError::BatchFeeOutOfRange(fee))
        }
    }
}
