//! Role table for privileged calls
//!
//! Role bootstrapping lives outside the manager. This is only the static
//! table the operator hands in through configuration, plus grant/revoke.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{Result, RollupManagerError};
use crate::types::{Address, CallContext};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    AddRollupType,
    ObsoleteRollupType,
    CreateRollup,
    AddExistingRollup,
    UpdateRollup,
    /// Verifies without waiting, force-consolidates, overrides pending states
    TrustedAggregator,
    TweakParameters,
    SetFee,
    /// Lifts the emergency halt
    StopEmergency,
    /// Activates the emergency halt at any time
    EmergencyCouncil,
}

impl Role {
    pub const ALL: [Role; 10] = [
        Role::AddRollupType,
        Role::ObsoleteRollupType,
        Role::CreateRollup,
        Role::AddExistingRollup,
        Role::UpdateRollup,
        Role::TrustedAggregator,
        Role::TweakParameters,
        Role::SetFee,
        Role::StopEmergency,
        Role::EmergencyCouncil,
    ];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::AddRollupType => "add_rollup_type",
            Role::ObsoleteRollupType => "obsolete_rollup_type",
            Role::CreateRollup => "create_rollup",
            Role::AddExistingRollup => "add_existing_rollup",
            Role::UpdateRollup => "update_rollup",
            Role::TrustedAggregator => "trusted_aggregator",
            Role::TweakParameters => "tweak_parameters",
            Role::SetFee => "set_fee",
            Role::StopEmergency => "stop_emergency",
            Role::EmergencyCouncil => "emergency_council",
        };
        f.write_str(name)
    }
}

/// Role membership
#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    members: HashMap<Role, HashSet<Address>>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, role: Role, account: Address) {
        self.members.entry(role).or_default().insert(account);
    }

    pub fn revoke(&mut self, role: Role, account: &Address) {
        if let Some(set) = self.members.get_mut(&role) {
            set.remove(account);
        }
    }

    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.members.get(&role).map_or(false, |set| set.contains(account))
    }

    pub fn ensure(&self, role: Role, ctx: &CallContext) -> Result<()> {
        if self.has_role(role, &ctx.caller) {
            Ok(())
        } else {
            Err(RollupManagerError::MissingRole {
                role,
                caller: format!("0x{}", hex::encode(ctx.caller)),
            })
        }
    }
}
