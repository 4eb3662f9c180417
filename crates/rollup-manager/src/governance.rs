//! Runtime parameter changes
//!
//! Outside an emergency the aggregation timeouts may only be lowered, so
//! governance can never lengthen the window in which a bad state could be
//! challenged. During an emergency any value up to the halt timeout is
//! accepted.

use crate::access::Role;
use crate::emergency::HALT_AGGREGATION_TIMEOUT;
use crate::error::{Result, RollupManagerError};
use crate::events::Event;
use crate::fee::FeeController;
use crate::manager::RollupManager;
use crate::types::{Amount, CallContext};

impl RollupManager {
    fn check_timeout_change(&self, current: u64, new: u64) -> Result<()> {
        if new > HALT_AGGREGATION_TIMEOUT {
            return Err(RollupManagerError::TimeoutExceedsHaltTimeout(new));
        }
        if !self.is_emergency_state && new >= current {
            return Err(RollupManagerError::TimeoutMustDecrease { current, new });
        }
        Ok(())
    }

    pub fn set_trusted_aggregator_timeout(&mut self, ctx: &CallContext, timeout: u64) -> Result<()> {
        self.access.ensure(Role::TweakParameters, ctx)?;
        self.check_timeout_change(self.trusted_aggregator_timeout, timeout)?;

        self.trusted_aggregator_timeout = timeout;
        tracing::info!(timeout, "trusted aggregator timeout set");
        self.emit(Event::SetTrustedAggregatorTimeout { timeout });
        Ok(())
    }

    pub fn set_pending_state_timeout(&mut self, ctx: &CallContext, timeout: u64) -> Result<()> {
        self.access.ensure(Role::TweakParameters, ctx)?;
        self.check_timeout_change(self.pending_state_timeout, timeout)?;

        self.pending_state_timeout = timeout;
        tracing::info!(timeout, "pending state timeout set");
        self.emit(Event::SetPendingStateTimeout { timeout });
        Ok(())
    }

    pub fn set_multiplier_batch_fee(&mut self, ctx: &CallContext, multiplier: u16) -> Result<()> {
        self.access.ensure(Role::TweakParameters, ctx)?;
        FeeController::validate_multiplier(multiplier)?;

        self.fee.multiplier_batch_fee = multiplier;
        tracing::info!(multiplier, "batch fee multiplier set");
        self.emit(Event::SetMultiplierBatchFee { multiplier });
        Ok(())
    }

    pub fn set_verify_batch_time_target(&mut self, ctx: &CallContext, target: u64) -> Result<()> {
        self.access.ensure(Role::TweakParameters, ctx)?;
        FeeController::validate_time_target(target)?;

        self.fee.verify_batch_time_target = target;
        tracing::info!(target, "verify batch time target set");
        self.emit(Event::SetVerifyBatchTimeTarget { target });
        Ok(())
    }

    pub fn set_batch_fee(&mut self, ctx: &CallContext, batch_fee: Amount) -> Result<()> {
        self.access.ensure(Role::SetFee, ctx)?;
        FeeController::validate_batch_fee(batch_fee)?;

        self.fee.batch_fee = batch_fee;
        tracing::info!(batch_fee, "batch fee set");
        self.emit(Event::SetBatchFee { batch_fee });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::{Devnet, ADMIN, OUTSIDER};
    use crate::fee::{MAX_BATCH_FEE, MIN_BATCH_FEE};

    fn admin() -> CallContext {
        CallContext::new(ADMIN, 10)
    }

    #[test]
    fn test_timeouts_only_decrease() {
        let mut net = Devnet::with_timeouts(1_000, 1_000).unwrap();

        net.manager.set_trusted_aggregator_timeout(&admin(), 500).unwrap();
        assert_eq!(net.manager.trusted_aggregator_timeout(), 500);
        assert_eq!(
            net.manager.set_trusted_aggregator_timeout(&admin(), 500),
            Err(RollupManagerError::TimeoutMustDecrease { current: 500, new: 500 })
        );
        assert_eq!(
            net.manager.set_pending_state_timeout(&admin(), 2_000),
            Err(RollupManagerError::TimeoutMustDecrease { current: 1_000, new: 2_000 })
        );
        net.manager.set_pending_state_timeout(&admin(), 0).unwrap();
        assert_eq!(net.manager.pending_state_timeout(), 0);
    }

    #[test]
    fn test_emergency_allows_increase_up_to_halt() {
        let mut net = Devnet::with_timeouts(1_000, 1_000).unwrap();
        net.manager.activate_emergency_state(&admin()).unwrap();

        net.manager.set_trusted_aggregator_timeout(&admin(), 5_000).unwrap();
        assert_eq!(
            net.manager.set_pending_state_timeout(&admin(), HALT_AGGREGATION_TIMEOUT + 1),
            Err(RollupManagerError::TimeoutExceedsHaltTimeout(HALT_AGGREGATION_TIMEOUT + 1))
        );
        net.manager
            .set_pending_state_timeout(&admin(), HALT_AGGREGATION_TIMEOUT)
            .unwrap();
    }

    #[test]
    fn test_fee_parameters() {
        let mut net = Devnet::with_timeouts(0, 0).unwrap();

        assert_eq!(
            net.manager.set_multiplier_batch_fee(&admin(), 999),
            Err(RollupManagerError::InvalidMultiplierBatchFee(999))
        );
        net.manager.set_multiplier_batch_fee(&admin(), 1023).unwrap();
        assert_eq!(net.manager.fee_controller().multiplier_batch_fee, 1023);

        assert!(net.manager.set_verify_batch_time_target(&admin(), 86_401).is_err());
        net.manager.set_verify_batch_time_target(&admin(), 60).unwrap();

        assert_eq!(
            net.manager.set_batch_fee(&admin(), MIN_BATCH_FEE - 1),
            Err(RollupManagerError::BatchFeeOutOfRange(MIN_BATCH_FEE - 1))
        );
        net.manager.set_batch_fee(&admin(), MAX_BATCH_FEE).unwrap();
        assert_eq!(net.manager.batch_fee(), MAX_BATCH_FEE);
        assert_eq!(net.manager.forced_batch_fee(), MAX_BATCH_FEE * 100);

        let events = net.manager.drain_events();
        assert!(events.contains(&Event::SetMultiplierBatchFee { multiplier: 1023 }));
        assert!(events.contains(&Event::SetVerifyBatchTimeTarget { target: 60 }));
        assert_eq!(events.last(), Some(&Event::SetBatchFee { batch_fee: MAX_BATCH_FEE }));
    }

    #[test]
    fn test_setters_need_roles() {
        let mut net = Devnet::with_timeouts(1_000, 1_000).unwrap();
        let outsider = CallContext::new(OUTSIDER, 10);

        assert!(matches!(
            net.manager.set_batch_fee(&outsider, MIN_BATCH_FEE),
            Err(RollupManagerError::MissingRole { role: Role::SetFee, .. })
        ));
        assert!(matches!(
            net.manager.set_pending_state_timeout(&outsider, 1),
            Err(RollupManagerError::MissingRole { role: Role::TweakParameters, .. })
        ));
    }
}
