//! Manager configuration
//!
//! Loaded from YAML by the binary. Every field has a default so a config file
//! only needs to list what it changes; roles have no defaults.
//!
//! ```yaml
//! trusted_aggregator_timeout: 3600
//! pending_state_timeout: 600
//! verify_batch_time_target: 1800
//! multiplier_batch_fee: 1002
//! batch_fee_gwei: 100000000
//! roles:
//!   trusted_aggregator:
//!     - "0x0202020202020202020202020202020202020202"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::access::{AccessControl, Role};
use crate::emergency::HALT_AGGREGATION_TIMEOUT;
use crate::error::RollupManagerError;
use crate::fee::FeeController;
use crate::types::{parse_fixed_hex, Address, Amount};

const GWEI: Amount = 1_000_000_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid address {value:?} for role {role}")]
    InvalidAddress { role: Role, value: String },

    #[error("invalid parameter: {0}")]
    Parameter(#[from] RollupManagerError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Seconds after sequencing before anyone may verify
    pub trusted_aggregator_timeout: u64,
    /// Seconds a pending state waits before it can be consolidated
    pub pending_state_timeout: u64,
    pub verify_batch_time_target: u64,
    pub multiplier_batch_fee: u16,
    /// Initial batch fee in gwei
    pub batch_fee_gwei: u64,
    /// Role name to hex addresses
    pub roles: HashMap<Role, Vec<String>>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let fee = FeeController::default();
        Self {
            trusted_aggregator_timeout: HALT_AGGREGATION_TIMEOUT,
            pending_state_timeout: HALT_AGGREGATION_TIMEOUT,
            verify_batch_time_target: fee.verify_batch_time_target,
            multiplier_batch_fee: fee.multiplier_batch_fee,
            batch_fee_gwei: (fee.batch_fee / GWEI) as u64,
            roles: HashMap::new(),
        }
    }
}

impl ManagerConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn batch_fee(&self) -> Amount {
        self.batch_fee_gwei as Amount * GWEI
    }

    /// Range checks shared with the runtime setters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trusted_aggregator_timeout > HALT_AGGREGATION_TIMEOUT {
            return Err(RollupManagerError::TimeoutExceedsHaltTimeout(self.trusted_aggregator_timeout).into());
        }
        if self.pending_state_timeout > HALT_AGGREGATION_TIMEOUT {
            return Err(RollupManagerError::TimeoutExceedsHaltTimeout(self.pending_state_timeout).into());
        }
        FeeController::validate_multiplier(self.multiplier_batch_fee)?;
        FeeController::validate_time_target(self.verify_batch_time_target)?;
        FeeController::validate_batch_fee(self.batch_fee())?;

        self.access_control().map(|_| ())
    }

    pub fn fee_controller(&self) -> FeeController {
        FeeController {
            batch_fee: self.batch_fee(),
            multiplier_batch_fee: self.multiplier_batch_fee,
            verify_batch_time_target: self.verify_batch_time_target,
        }
    }

    /// Parse the role table
    pub fn access_control(&self) -> Result<AccessControl, ConfigError> {
        let mut access = AccessControl::new();
        for (role, members) in &self.roles {
            for value in members {
                let address: Address = parse_fixed_hex(value).map_err(|_| ConfigError::InvalidAddress {
                    role: *role,
                    value: value.clone(),
                })?;
                access.grant(*role, address);
            }
        }
        Ok(access)
    }

    /// Grant a role in the config itself, used when building configs in code
    pub fn with_role(mut self, role: Role, address: &Address) -> Self {
        self.roles
            .entry(role)
            .or_default()
            .push(format!("0x{}", hex::encode(address)));
        self
    }
}
