//! Emergency halt
//!
//! While halted, sequencing, untrusted verification, permissionless
//! consolidation and non-determinism proofs are refused. Registered
//! listeners (the bridge) halt and resume together with the manager.

use crate::access::Role;
use crate::error::{Result, RollupManagerError};
use crate::events::Event;
use crate::manager::RollupManager;
use crate::types::CallContext;

/// One week. Upper bound for both aggregation timeouts, and how long
/// aggregation must be stalled before anyone may halt the system.
pub const HALT_AGGREGATION_TIMEOUT: u64 = 7 * 24 * 60 * 60;

impl RollupManager {
    pub(crate) fn ensure_not_emergency(&self) -> Result<()> {
        if self.is_emergency_state {
            Err(RollupManagerError::EmergencyHalted)
        } else {
            Ok(())
        }
    }

    /// Halt the system
    ///
    /// The emergency council may always halt. Anyone else only once
    /// aggregation has happened at least once and then stalled for
    /// `HALT_AGGREGATION_TIMEOUT`.
    pub fn activate_emergency_state(&mut self, ctx: &CallContext) -> Result<()> {
        if !self.access.has_role(Role::EmergencyCouncil, &ctx.caller) {
            let stalled = self.last_aggregation_timestamp != 0
                && self
                    .last_aggregation_timestamp
                    .saturating_add(HALT_AGGREGATION_TIMEOUT)
                    <= ctx.now;
            if !stalled {
                return Err(RollupManagerError::HaltTimeoutNotExpired);
            }
        }
        self.enter_emergency_state()
    }

    /// Resume normal operation
    pub fn deactivate_emergency_state(&mut self, ctx: &CallContext) -> Result<()> {
        self.access.ensure(Role::StopEmergency, ctx)?;
        if !self.is_emergency_state {
            return Err(RollupManagerError::NotHalted);
        }

        self.is_emergency_state = false;
        for listener in &self.emergency_listeners {
            listener.deactivate_emergency_state();
        }

        tracing::warn!("emergency state deactivated");
        self.emit(Event::EmergencyStateDeactivated);
        Ok(())
    }

    /// Shared by explicit activation and non-determinism proofs
    pub(crate) fn enter_emergency_state(&mut self) -> Result<()> {
        if self.is_emergency_state {
            return Err(RollupManagerError::AlreadyHalted);
        }

        self.is_emergency_state = true;
        for listener in &self.emergency_listeners {
            listener.activate_emergency_state();
        }

        tracing::warn!("emergency state activated");
        self.emit(Event::EmergencyStateActivated);
        Ok(())
    }
}
