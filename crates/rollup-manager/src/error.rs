//! error types for the rollup manager

use thiserror::Error;

use crate::access::Role;
use crate::types::{Amount, BatchNum, ChainId, RollupId, RollupTypeId, Timestamp};

pub type Result<T> = std::result::Result<T, RollupManagerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollupManagerError {
    // === access ===
    #[error("caller {caller} is missing role {role}")]
    MissingRole { role: Role, caller: String },

    // === registry ===
    #[error("rollup type {0} does not exist")]
    RollupTypeNotFound(RollupTypeId),

    #[error("rollup type {0} is obsolete")]
    RollupTypeObsolete(RollupTypeId),

    #[error("chain id {0} already registered")]
    ChainIdTaken(ChainId),

    #[error("rollup address {0} already registered")]
    RollupAddressTaken(String),

    #[error("rollup {0} does not exist")]
    RollupNotFound(RollupId),

    #[error("no rollup registered at {0}")]
    RollupContractNotFound(String),

    #[error("rollup is already on the requested type")]
    UpdateToSameRollupType,

    #[error("compatibility mismatch: rollup has {current}, type has {new}")]
    UpdateNotCompatible { current: u8, new: u8 },

    // === sequencing ===
    #[error("caller {0} is not a registered rollup")]
    NotARegisteredRollup(String),

    #[error("must sequence at least one batch")]
    ZeroBatches,

    #[error("sequenced {requested} forced batches but only {pending} are pending")]
    ForcedBatchesUnderflow { requested: u64, pending: u64 },

    #[error("batch counter overflow")]
    BatchCountOverflow,

    // === verification ===
    #[error("init batch {init} precedes the fork boundary at {boundary}")]
    InitBatchBeforeUpgrade { init: BatchNum, boundary: BatchNum },

    #[error("pending state {0} does not exist")]
    PendingStateNotFound(u64),

    #[error("init batch {got} does not match pending state batch {expected}")]
    InitBatchMismatch { expected: BatchNum, got: BatchNum },

    #[error("no consolidated state root at batch {0}")]
    OldStateRootMissing(BatchNum),

    #[error("init batch {init} is above the verified tip {tip}")]
    InitBatchAboveTip { init: BatchNum, tip: BatchNum },

    #[error("final batch {final_batch} is not above the verified tip {tip}")]
    FinalBatchNotAboveTip { final_batch: BatchNum, tip: BatchNum },

    #[error("no accumulated input hash at init batch {0}")]
    OldAccInputHashMissing(BatchNum),

    #[error("no accumulated input hash at final batch {0}")]
    NewAccInputHashMissing(BatchNum),

    #[error("range of {span} batches exceeds the maximum of {max}")]
    ExceedMaxVerifyBatches { span: u64, max: u64 },

    #[error("no verifier registered at {0}")]
    VerifierNotFound(String),

    #[error("reward transfer failed: {0}")]
    RewardTransferFailed(String),

    // === pending states ===
    #[error("pending state {0} is already consolidated or does not exist")]
    InvalidPendingStateNum(u64),

    #[error("pending state {0} is not a valid unconsolidated target")]
    FinalPendingStateNumInvalid(u64),

    #[error("final batch {got} does not match pending state batch {expected}")]
    FinalBatchMismatch { expected: BatchNum, got: BatchNum },

    // === temporal ===
    #[error("trusted aggregator timeout not expired, ready at {ready_at}")]
    TrustedAggregatorTimeoutNotExpired { ready_at: Timestamp },

    #[error("pending state {0} is not consolidable yet")]
    PendingStateNotConsolidable(u64),

    #[error("aggregation halt timeout not expired")]
    HaltTimeoutNotExpired,

    // === cryptographic ===
    #[error("proof rejected by verifier")]
    InvalidProof,

    #[error("proved state root equals the stored one")]
    RootsIdentical,

    // === emergency ===
    #[error("emergency state active")]
    EmergencyHalted,

    #[error("emergency state already active")]
    AlreadyHalted,

    #[error("emergency state not active")]
    NotHalted,

    // === parameters ===
    #[error("multiplier {0} outside [1000, 1023]")]
    InvalidMultiplierBatchFee(u16),

    #[error("verify batch time target {0}s exceeds one day")]
    InvalidVerifyBatchTimeTarget(u64),

    #[error("batch fee {0} outside allowed range")]
    BatchFeeOutOfRange(Amount),

    #[error("timeout {0}s exceeds the halt aggregation timeout")]
    TimeoutExceedsHaltTimeout(u64),

    #[error("timeout must decrease outside emergency: current {current}s, new {new}s")]
    TimeoutMustDecrease { current: u64, new: u64 },
}

/// How a caller should react to a rejected call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Wrong arguments or identity, resubmit with correct ones
    Precondition,
    /// Too early, wait and retry the same call
    Temporal,
    /// The claim itself is wrong
    Cryptographic,
    /// Everything mutating is frozen until the halt is lifted
    Halted,
}

impl RollupManagerError {
    pub fn category(&self) -> ErrorCategory {
        use RollupManagerError::*;
        match self {
            TrustedAggregatorTimeoutNotExpired { .. }
            | PendingStateNotConsolidable(_)
            | HaltTimeoutNotExpired => ErrorCategory::Temporal,
            InvalidProof | RootsIdentical => ErrorCategory::Cryptographic,
            EmergencyHalted => ErrorCategory::Halted,
            _ => ErrorCategory::Precondition,
        }
    }
}
