//! Rollup Manager - multi-rollup sequencing, verification and finality
//!
//! Coordinates many independent rollups on one settlement layer. Rollups
//! report what they sequenced; aggregators submit succinct proofs that move
//! a rollup's verified state forward; the manager decides when a verified
//! state becomes final and aggregates every rollup's exit root into one.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    ROLLUP CONSENSUS INSTANCES                    │
//! │        on_sequence_batches / on_force_batch (callbacks)          │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ROLLUP MANAGER                           │
//! │                                                                  │
//! │  registry ── sequencing checkpoints ── verification engine       │
//! │                                            │                     │
//! │          fee controller ◄──────────────────┤                     │
//! │                                            ▼                     │
//! │        pending states ──(timeout)──► consolidated tip            │
//! │                                            │                     │
//! │                     exit root aggregation ◄┘                     │
//! │                                                                  │
//! │  emergency halt: non-determinism proof or stalled aggregation    │
//! └──────┬────────────────┬─────────────────┬────────────────┬───────┘
//!        ▼                ▼                 ▼                ▼
//!   ProofVerifier    RewardLedger     ExitRootSink    EmergencyListener
//! ```
//!
//! # Finality
//!
//! - **Trusted aggregator**: verified batches are final immediately
//! - **Anyone else**: only after `trusted_aggregator_timeout` has passed
//!   since sequencing; the result is pending for `pending_state_timeout`
//!   before it consolidates
//! - **Disagreement**: two valid proofs from the same start to different
//!   roots halt the whole system

pub mod types;
pub mod error;
pub mod access;
pub mod hash_chain;
pub mod collaborators;
pub mod exit_root;
pub mod fee;
pub mod config;
pub mod events;
pub mod registry;
pub mod manager;
pub mod sequencing;
pub mod verification;
pub mod emergency;
pub mod governance;
pub mod memory;
pub mod devnet;

pub use types::*;
pub use error::{ErrorCategory, Result, RollupManagerError};
pub use access::{AccessControl, Role};
pub use collaborators::{EmergencyListener, ExitRootSink, ProofVerifier, RewardLedger, RollupConsensus};
pub use config::{ConfigError, ManagerConfig};
pub use events::Event;
pub use exit_root::compute_rollup_exit_root;
pub use fee::FeeController;
pub use hash_chain::{BatchData, InputHashChain};
pub use manager::{ManagerSnapshot, RollupManager};
pub use registry::{ExistingRollup, RollupRegistry};
pub use verification::{SnarkInput, StateTransition, MAX_VERIFY_BATCHES};
pub use emergency::HALT_AGGREGATION_TIMEOUT;
pub use devnet::{Devnet, SimulationConfig, SimulationFile, SimulationReport};
