use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use chain_primitives::commitment::CommitmentLeaf;
use chain_primitives::subsetsum::{derive_problem, derive_seed, Solution, Tier, VerifyBudget};
use chain_primitives::{Hash, KeyPair, MerkleTree};
use consensus_core::{
    Block, BuildParams, ConsensusEngine, OffchainCid, OpenWorkStrategy, ProblemMetadata,
};
use slashing::{Evidence, Offence, SlashingManager};

#[derive(Parser)]
#[command(name = "subsum-node", about = "Reference node for the Subsum consensus core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Builds and prints the genesis block.
    Genesis,
    /// Mines and submits a handful of blocks against an in-memory chain.
    Mine {
        #[arg(long, default_value_t = 3)]
        blocks: u64,
    },
    /// Walks through a double-sign slashing scenario.
    SlashDemo,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Genesis => run_genesis(),
        Command::Mine { blocks } => run_mine(blocks),
        Command::SlashDemo => run_slash_demo(),
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(NodeError::Config(msg)) => {
            eprintln!("config error: {msg}");
            ExitCode::from(2)
        }
        Err(NodeError::Storage(msg)) => {
            eprintln!("storage error: {msg}");
            ExitCode::from(3)
        }
        Err(NodeError::Divergence(msg)) => {
            eprintln!("consensus divergence detected: {msg}");
            ExitCode::from(4)
        }
    }
}

enum NodeError {
    Config(String),
    Storage(String),
    Divergence(String),
}

fn dummy_reveal() -> chain_primitives::Reveal {
    use chain_primitives::Address;
    let witness = Solution { elements: vec![1] };
    let salt = [0u8; 32];
    let leaf = CommitmentLeaf::new(&Hash::zero(), &Address::zero(), 0, 0, &witness, &salt);
    let tree = MerkleTree::build(&[leaf.as_leaf_hash()]);
    chain_primitives::Reveal {
        leaf,
        inclusion_proof: tree.prove(0).unwrap(),
        salt,
        witness,
    }
}

fn genesis_block() -> Block {
    use chain_primitives::subsetsum::Problem;
    Block::genesis(
        1,
        Hash::zero(),
        Hash::zero(),
        Problem {
            multiset: vec![1, 2, 3, 4, 5, 6, 7, 8],
            target: 1,
            tier: Tier::One,
        },
        dummy_reveal(),
        OffchainCid::new("bafy-genesis").expect("literal CID is always valid"),
        0,
    )
}

fn run_genesis() -> Result<(), NodeError> {
    let genesis = genesis_block();
    info!(hash = %genesis.hash(), "built genesis block");
    println!("genesis header hash: {}", genesis.hash());
    Ok(())
}

/// Solves the anti-grinding Subset-Sum instance bound to `parent_hash` by
/// brute force over the planted-solution problem — fine for a tier-1 demo,
/// not how a real miner would search larger tiers.
fn mine_problem(parent_hash: &Hash, miner: &chain_primitives::Address, commit_epoch: u64) -> ProblemMetadata {
    let seed = derive_seed(parent_hash, commit_epoch, miner, 0);
    let problem = derive_problem(seed, Tier::One);
    let n = problem.multiset.len();
    let mut witness = None;
    'search: for mask in 1u32..(1u32 << n) {
        let mut sum = 0u64;
        let mut picked = Vec::new();
        for i in 0..n {
            if mask & (1 << i) != 0 {
                sum += problem.multiset[i];
                picked.push(problem.multiset[i]);
            }
        }
        if sum == problem.target {
            witness = Some(picked);
            break 'search;
        }
    }
    let solution = Solution {
        elements: witness.expect("tier-1 instances always have a small planted solution"),
    };
    let salt = [7u8; 32];
    let leaf = CommitmentLeaf::new(&seed, miner, commit_epoch, 0, &solution, &salt);
    let tree = MerkleTree::build(&[leaf.as_leaf_hash()]);
    ProblemMetadata {
        problem,
        reveal: chain_primitives::Reveal {
            leaf,
            inclusion_proof: tree.prove(0).unwrap(),
            salt,
            witness: solution,
        },
    }
}

fn run_mine(blocks: u64) -> Result<(), NodeError> {
    let genesis = genesis_block();
    let engine = ConsensusEngine::new_in_memory(genesis);
    let miner = KeyPair::generate();
    let mempool = consensus_core::InMemoryMempool::new();
    let strategy = OpenWorkStrategy {
        verify_budget: VerifyBudget::default(),
    };

    for height in 1..=blocks {
        let parent_hash = engine.canonical_tip_hash();
        let metadata = mine_problem(&parent_hash, &miner.address(), height);
        let params = BuildParams {
            miner_pubkey: miner.address(),
            commit_nonce: 0,
            commit_epoch: height,
            difficulty_target: 1,
            problem_metadata: metadata,
            offchain_cid: OffchainCid::new(format!("bafy-block-{height}"))
                .map_err(|e| NodeError::Config(e.to_string()))?,
            now: height as i64,
        };
        let candidate = engine
            .build_candidate(&mempool, params)
            .map_err(|e| NodeError::Storage(e.to_string()))?;
        let candidate_hash = candidate.hash();

        match engine.submit_block(candidate, &strategy, height as i64) {
            Ok(Some(event)) => info!(?event, "reorg committed"),
            Ok(None) => info!(height, hash = %candidate_hash, "extended canonical chain"),
            Err(e) => {
                warn!(error = %e, "block rejected");
                return Err(NodeError::Divergence(e.to_string()));
            }
        }
    }

    println!("canonical tip: {}", engine.canonical_tip_hash());
    Ok(())
}

fn run_slash_demo() -> Result<(), NodeError> {
    let v1 = KeyPair::generate().address();
    let v2 = KeyPair::generate().address();
    let mut manager = SlashingManager::new(vec![v1, v2]);

    let evidence = Evidence::new(v1, Offence::DoubleSign, 7, Vec::new(), 0);
    manager
        .record_offence(evidence, 0)
        .map_err(|e| NodeError::Config(e.to_string()))?;

    let status = manager.status(&v1).expect("validator is known");
    println!(
        "validator {v1} reputation={} jailed={} banned={}",
        status.reputation,
        status.is_jailed(0),
        status.is_banned()
    );

    manager
        .record_produced_block(&v1)
        .map_err(|e| NodeError::Config(e.to_string()))?;
    let status = manager.status(&v1).expect("validator is known");
    println!("after one produced block, reputation={}", status.reputation);

    Ok(())
}
