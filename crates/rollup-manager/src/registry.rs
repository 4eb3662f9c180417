//! Rollup registry - rollup types and live rollup instances
//!
//! Types are templates (verifier, fork, genesis). Rollups are instances,
//! stored in a dense arena indexed by `rollup_id - 1`, with lookup tables
//! from chain id and from the rollup's own address.

use std::collections::HashMap;
use std::sync::Arc;

use crate::access::Role;
use crate::collaborators::RollupConsensus;
use crate::error::{Result, RollupManagerError};
use crate::events::Event;
use crate::manager::RollupManager;
use crate::types::*;

/// Catalog of rollup types and instances
#[derive(Debug, Clone, Default)]
pub struct RollupRegistry {
    /// Index `i` holds type `i + 1`
    rollup_types: Vec<RollupType>,
    /// Index `i` holds rollup `i + 1`
    rollups: Vec<RollupData>,
    chain_id_to_rollup_id: HashMap<ChainId, RollupId>,
    rollup_address_to_id: HashMap<Address, RollupId>,
}

impl RollupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, returns its id
    pub fn add_rollup_type(&mut self, rollup_type: RollupType) -> RollupTypeId {
        self.rollup_types.push(rollup_type);
        self.rollup_types.len() as RollupTypeId
    }

    pub fn rollup_type(&self, id: RollupTypeId) -> Option<&RollupType> {
        if id == 0 {
            return None;
        }
        self.rollup_types.get(id as usize - 1)
    }

    fn rollup_type_mut(&mut self, id: RollupTypeId) -> Option<&mut RollupType> {
        if id == 0 {
            return None;
        }
        self.rollup_types.get_mut(id as usize - 1)
    }

    /// Mark a type non-instantiable, existing rollups keep running
    pub fn obsolete_rollup_type(&mut self, id: RollupTypeId) -> Result<()> {
        let rollup_type = self
            .rollup_type_mut(id)
            .ok_or(RollupManagerError::RollupTypeNotFound(id))?;
        if rollup_type.obsolete {
            return Err(RollupManagerError::RollupTypeObsolete(id));
        }
        rollup_type.obsolete = true;
        Ok(())
    }

    /// Type that can still be instantiated or upgraded to
    pub fn live_rollup_type(&self, id: RollupTypeId) -> Result<&RollupType> {
        let rollup_type = self
            .rollup_type(id)
            .ok_or(RollupManagerError::RollupTypeNotFound(id))?;
        if rollup_type.obsolete {
            return Err(RollupManagerError::RollupTypeObsolete(id));
        }
        Ok(rollup_type)
    }

    /// Identifier checks shared by both allocation paths
    pub fn ensure_unclaimed(&self, chain_id: ChainId, rollup_contract: &Address) -> Result<()> {
        if self.chain_id_to_rollup_id.contains_key(&chain_id) {
            return Err(RollupManagerError::ChainIdTaken(chain_id));
        }
        if self.rollup_address_to_id.contains_key(rollup_contract) {
            return Err(RollupManagerError::RollupAddressTaken(format!(
                "0x{}",
                hex::encode(rollup_contract)
            )));
        }
        Ok(())
    }

    /// Allocate the next rollup id for `rollup`
    pub fn insert_rollup(&mut self, rollup: RollupData) -> Result<RollupId> {
        self.ensure_unclaimed(rollup.chain_id, &rollup.rollup_contract)?;

        let id = self.rollups.len() as RollupId + 1;
        self.chain_id_to_rollup_id.insert(rollup.chain_id, id);
        self.rollup_address_to_id.insert(rollup.rollup_contract, id);
        self.rollups.push(rollup);
        Ok(id)
    }

    pub fn rollup(&self, id: RollupId) -> Option<&RollupData> {
        if id == 0 {
            return None;
        }
        self.rollups.get(id as usize - 1)
    }

    pub fn rollup_mut(&mut self, id: RollupId) -> Option<&mut RollupData> {
        if id == 0 {
            return None;
        }
        self.rollups.get_mut(id as usize - 1)
    }

    pub fn rollup_id_by_chain(&self, chain_id: ChainId) -> Option<RollupId> {
        self.chain_id_to_rollup_id.get(&chain_id).copied()
    }

    pub fn rollup_id_by_address(&self, address: &Address) -> Option<RollupId> {
        self.rollup_address_to_id.get(address).copied()
    }

    pub fn rollup_count(&self) -> u32 {
        self.rollups.len() as u32
    }

    pub fn rollup_type_count(&self) -> u32 {
        self.rollup_types.len() as u32
    }

    pub fn rollups(&self) -> impl Iterator<Item = (RollupId, &RollupData)> {
        self.rollups
            .iter()
            .enumerate()
            .map(|(i, r)| (i as RollupId + 1, r))
    }

    pub fn rollup_types(&self) -> impl Iterator<Item = (RollupTypeId, &RollupType)> {
        self.rollup_types
            .iter()
            .enumerate()
            .map(|(i, t)| (i as RollupTypeId + 1, t))
    }

    /// Local exit roots in rollup id order
    pub fn local_exit_roots(&self) -> Vec<Hash> {
        self.rollups.iter().map(|r| r.last_local_exit_root).collect()
    }
}

/// Parameters for migrating a rollup that already has history
#[derive(Clone, Debug)]
pub struct ExistingRollup {
    pub rollup_contract: Address,
    pub verifier: Address,
    pub fork_id: u64,
    pub chain_id: ChainId,
    pub genesis: Hash,
    pub compatibility_id: u8,
}

impl RollupManager {
    /// Register a new rollup template
    pub fn add_rollup_type(&mut self, ctx: &CallContext, rollup_type: RollupType) -> Result<RollupTypeId> {
        self.access.ensure(Role::AddRollupType, ctx)?;

        let event = Event::AddRollupType {
            rollup_type_id: self.registry.rollup_type_count() + 1,
            verifier: rollup_type.verifier,
            fork_id: rollup_type.fork_id,
            compatibility_id: rollup_type.compatibility_id,
            genesis: rollup_type.genesis,
        };
        let id = self.registry.add_rollup_type(RollupType {
            obsolete: false,
            ..rollup_type
        });

        tracing::info!(rollup_type_id = id, "rollup type added");
        self.emit(event);
        Ok(id)
    }

    pub fn obsolete_rollup_type(&mut self, ctx: &CallContext, rollup_type_id: RollupTypeId) -> Result<()> {
        self.access.ensure(Role::ObsoleteRollupType, ctx)?;
        self.registry.obsolete_rollup_type(rollup_type_id)?;

        tracing::info!(rollup_type_id, "rollup type obsoleted");
        self.emit(Event::ObsoleteRollupType { rollup_type_id });
        Ok(())
    }

    /// Instantiate a rollup from a live type
    ///
    /// `rollup_contract` is the identity the rollup's consensus uses when it
    /// calls back (sequencing, forced batches). Deployment happens elsewhere.
    pub fn create_rollup(
        &mut self,
        ctx: &CallContext,
        rollup_type_id: RollupTypeId,
        chain_id: ChainId,
        rollup_contract: Address,
        consensus: Arc<dyn RollupConsensus>,
    ) -> Result<RollupId> {
        self.access.ensure(Role::CreateRollup, ctx)?;

        let rollup_type = self.registry.live_rollup_type(rollup_type_id)?;
        let rollup = RollupData::new(
            rollup_contract,
            chain_id,
            rollup_type.verifier,
            rollup_type.fork_id,
            rollup_type_id,
            rollup_type.compatibility_id,
            rollup_type.genesis,
        );
        let rollup_id = self.registry.insert_rollup(rollup)?;
        self.consensus.insert(rollup_id, consensus);

        tracing::info!(rollup_id, rollup_type_id, chain_id, "rollup created");
        self.emit(Event::CreateRollup {
            rollup_id,
            rollup_type_id,
            rollup_contract,
            chain_id,
        });
        Ok(rollup_id)
    }

    /// Bring a previously standalone rollup under management
    pub fn add_existing_rollup(
        &mut self,
        ctx: &CallContext,
        existing: ExistingRollup,
        consensus: Arc<dyn RollupConsensus>,
    ) -> Result<RollupId> {
        self.access.ensure(Role::AddExistingRollup, ctx)?;

        let rollup = RollupData::new(
            existing.rollup_contract,
            existing.chain_id,
            existing.verifier,
            existing.fork_id,
            0,
            existing.compatibility_id,
            existing.genesis,
        );
        let rollup_id = self.registry.insert_rollup(rollup)?;
        self.consensus.insert(rollup_id, consensus);

        tracing::info!(rollup_id, chain_id = existing.chain_id, "existing rollup added");
        self.emit(Event::AddExistingRollup {
            rollup_id,
            fork_id: existing.fork_id,
            rollup_contract: existing.rollup_contract,
            chain_id: existing.chain_id,
            compatibility_id: existing.compatibility_id,
        });
        Ok(rollup_id)
    }

    /// Move a rollup to a compatible type
    ///
    /// Records the current tip as the fork boundary: proofs starting below it
    /// were produced under the old fork's rules and are rejected.
    pub fn update_rollup(
        &mut self,
        ctx: &CallContext,
        rollup_contract: &Address,
        new_rollup_type_id: RollupTypeId,
    ) -> Result<()> {
        self.access.ensure(Role::UpdateRollup, ctx)?;

        let rollup_id = self.registry.rollup_id_by_address(rollup_contract).ok_or_else(|| {
            RollupManagerError::RollupContractNotFound(format!("0x{}", hex::encode(rollup_contract)))
        })?;
        let current = self.rollup(rollup_id)?;
        if current.rollup_type_id == new_rollup_type_id {
            return Err(RollupManagerError::UpdateToSameRollupType);
        }

        let new_type = self.registry.live_rollup_type(new_rollup_type_id)?.clone();
        if current.compatibility_id != new_type.compatibility_id {
            return Err(RollupManagerError::UpdateNotCompatible {
                current: current.compatibility_id,
                new: new_type.compatibility_id,
            });
        }
        let boundary = current.effective_last_verified_batch();

        let rollup = self.rollup_mut(rollup_id)?;
        rollup.verifier = new_type.verifier;
        rollup.fork_id = new_type.fork_id;
        rollup.rollup_type_id = new_rollup_type_id;
        rollup.last_verified_batch_before_upgrade = boundary;

        tracing::info!(rollup_id, new_rollup_type_id, boundary, "rollup updated");
        self.emit(Event::UpdateRollup {
            rollup_id,
            new_rollup_type_id,
            last_verified_batch_before_upgrade: boundary,
        });
        Ok(())
    }
}
