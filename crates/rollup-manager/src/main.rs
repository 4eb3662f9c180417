//! Rollup Manager CLI
//!
//! Runs a scripted multi-rollup simulation against in-memory collaborators
//! and exposes a couple of offline helpers.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rollup_manager::{
    compute_rollup_exit_root,
    exit_root::{exit_root_siblings, root_from_siblings, EXIT_TREE_DEPTH},
    fee::{MAX_BATCH_FEE, MAX_MULTIPLIER_BATCH_FEE, MIN_BATCH_FEE, MIN_MULTIPLIER_BATCH_FEE},
    parse_fixed_hex, Devnet, Hash, ManagerConfig, SimulationFile, HALT_AGGREGATION_TIMEOUT,
    MAX_VERIFY_BATCHES,
};

#[derive(Parser)]
#[command(name = "rollup-manager")]
#[command(about = "Multi-rollup sequencing, verification and finality manager")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Run a scripted simulation on a local devnet
    Simulate {
        /// YAML config (manager parameters plus a `simulation` section)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the number of rounds
        #[arg(short, long)]
        rounds: Option<u32>,

        /// Print the final state snapshot as JSON
        #[arg(long)]
        snapshot: bool,
    },

    /// Compute the aggregated exit root over hex-encoded local exit roots
    ExitRoot {
        /// Local exit roots in rollup id order
        leaves: Vec<String>,

        /// Also print the sibling path of the leaf at this position
        #[arg(short, long)]
        index: Option<usize>,
    },

    /// Show protocol constants and default parameters
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("rollup_manager=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Simulate { config, rounds, snapshot } => simulate(config, rounds, snapshot),
        Command::ExitRoot { leaves, index } => exit_root(&leaves, index),
        Command::Info => {
            show_info();
            Ok(())
        }
    }
}

fn simulate(config: Option<PathBuf>, rounds: Option<u32>, snapshot: bool) -> Result<()> {
    let mut file = match &config {
        Some(path) => SimulationFile::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SimulationFile::default(),
    };
    if let Some(rounds) = rounds {
        file.simulation.rounds = rounds;
    }

    tracing::info!(
        rollups = file.simulation.rollups,
        rounds = file.simulation.rounds,
        batches_per_round = file.simulation.batches_per_round,
        "starting simulation"
    );

    let mut devnet = Devnet::new(file.manager)?;
    let report = devnet.run_simulation(&file.simulation)?;

    println!("\n=== Simulation Summary ===");
    println!("Rounds: {}", report.rounds);
    println!(
        "Verifications: {} trusted, {} permissionless",
        report.trusted_verifications, report.untrusted_verifications
    );
    println!("Pending states consolidated: {}", report.consolidations);
    println!(
        "Batches: {} sequenced, {} verified",
        report.total_sequenced_batches, report.total_verified_batches
    );
    println!("Rewards paid: {}", report.rewards_paid);
    println!(
        "Batch fee: {} -> {}",
        report.initial_batch_fee, report.final_batch_fee
    );
    println!("Rollup exit root: 0x{}", hex::encode(report.rollup_exit_root));

    if snapshot {
        println!("{}", devnet.manager.snapshot().to_json()?);
    }
    Ok(())
}

fn exit_root(leaves: &[String], index: Option<usize>) -> Result<()> {
    let leaves = leaves
        .iter()
        .map(|leaf| parse_fixed_hex::<32>(leaf).with_context(|| format!("invalid leaf {}", leaf)))
        .collect::<Result<Vec<Hash>>>()?;

    let root = compute_rollup_exit_root(&leaves);
    println!("0x{}", hex::encode(root));

    if let Some(index) = index {
        let siblings = exit_root_siblings(&leaves, index)
            .with_context(|| format!("index {} out of range for {} leaves", index, leaves.len()))?;
        anyhow::ensure!(
            root_from_siblings(index, leaves[index], &siblings) == root,
            "sibling path does not reproduce the root"
        );
        for (level, sibling) in siblings.iter().enumerate() {
            println!("{:2} 0x{}", level, hex::encode(sibling));
        }
    }
    Ok(())
}

fn show_info() {
    let defaults = ManagerConfig::default();

    println!("=== Rollup Manager ===");
    println!();
    println!("Protocol constants:");
    println!("  Halt aggregation timeout: {}s", HALT_AGGREGATION_TIMEOUT);
    println!("  Max batches per verification: {}", MAX_VERIFY_BATCHES);
    println!("  Exit tree depth: {}", EXIT_TREE_DEPTH);
    println!("  Batch fee range: [{}, {}]", MIN_BATCH_FEE, MAX_BATCH_FEE);
    println!(
        "  Fee multiplier range: [{}, {}]",
        MIN_MULTIPLIER_BATCH_FEE, MAX_MULTIPLIER_BATCH_FEE
    );
    println!();
    println!("Default parameters:");
    println!("  Trusted aggregator timeout: {}s", defaults.trusted_aggregator_timeout);
    println!("  Pending state timeout: {}s", defaults.pending_state_timeout);
    println!("  Verify batch time target: {}s", defaults.verify_batch_time_target);
    println!("  Fee multiplier: {}", defaults.multiplier_batch_fee);
    println!("  Batch fee: {} gwei", defaults.batch_fee_gwei);
}
