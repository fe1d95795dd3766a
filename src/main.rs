//! Single-process remittance ledger demo.
//!
//! Funds two accounts from a development faucet, stakes, opens a
//! hash-locked remittance and claims it, producing blocks along the way.
//!
//! # Usage
//! ```text
//! remitchain [OPTIONS]
//! ```
//!
//! # Options
//! - `--pos`: Produce proof-of-stake blocks once a validator has stake
//! - `--difficulty <bits>`: Proof-of-work difficulty in leading zero bits
//! - `--threads <n>`: Mining threads
//! - `--interval-ms <ms>`: Pause between blocks
//! - `--blocks <n>`: Extra blocks to produce after the remittance
//! - `--miner <address>`: Address credited for mined blocks (defaults to the faucet)
//!
//! The minimum log level is read from `REMITCHAIN_LOG`.

use remitchain::consensus::ConsensusError;
use remitchain::core::block::Block;
use remitchain::core::ledger::{Ledger, ProductionPolicy};
use remitchain::core::params::{ChainParams, GenesisAllocation};
use remitchain::core::transaction::{Transaction, TxPayload};
use remitchain::crypto;
use remitchain::crypto::key_pair::PrivateKey;
use remitchain::types::address::Address;
use remitchain::types::bytes::Bytes;
use remitchain::{error, info, warn};
use std::env;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;

/// Secret of the development faucet. Never use outside a local chain.
const DEV_FAUCET_SECRET: [u8; 32] = [0x11; 32];
const FAUCET_BALANCE: u128 = 1_000_000_000;
const REMIT_SECRET: &[u8] = b"demo-remittance-secret";

struct Options {
    pos: bool,
    difficulty: Option<u32>,
    threads: Option<usize>,
    interval: Duration,
    blocks: u64,
    miner: Option<Address>,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let options = parse_args(&args);

    let Some(faucet) = PrivateKey::from_bytes(&DEV_FAUCET_SECRET) else {
        eprintln!("Invalid faucet secret");
        process::exit(1);
    };
    let alice = PrivateKey::new();
    let bob = PrivateKey::new();

    let mut params = ChainParams::dev_with_allocations(vec![GenesisAllocation::new(
        faucet.address(),
        FAUCET_BALANCE,
    )]);
    if let Some(difficulty) = options.difficulty {
        params.pow.difficulty = difficulty;
    }
    if let Some(threads) = options.threads {
        params.pow.threads = threads;
    }
    let chain_id = params.chain_id;
    let ledger = Arc::new(Ledger::new(params));

    info!(
        "Accounts: faucet={} alice={} bob={}",
        faucet.address(),
        alice.address(),
        bob.address()
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let ledger = Arc::clone(&ledger);
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to setup Ctrl+C handler: {e}");
                return;
            }
            info!("Ctrl+C received, shutting down...");
            stop.store(true, Ordering::Relaxed);
            ledger.cancel_mining();
        });
    }

    let miner = options.miner.unwrap_or_else(|| faucet.address());

    submit(&ledger, pay(&faucet, alice.address(), 10_000_000, 0, chain_id));
    submit(&ledger, pay(&faucet, bob.address(), 1_000, 1, chain_id));
    produce(&ledger, miner, ProductionPolicy::ProofOfWork).await;

    submit(&ledger, build(TxPayload::Stake, 1_000_000, 10, 0, &alice, chain_id));
    let open = build(
        TxPayload::OpenRemit {
            recipient: bob.address(),
            hash_lock: crypto::hash_lock(REMIT_SECRET),
        },
        250_000,
        10,
        1,
        &alice,
        chain_id,
    );
    let escrow_id = submit(&ledger, open);
    produce(&ledger, miner, ProductionPolicy::ProofOfWork).await;

    if let Some(escrow_id) = escrow_id {
        let claim = build(
            TxPayload::ClaimRemit {
                escrow_id,
                preimage: Bytes::new(REMIT_SECRET),
            },
            0,
            10,
            0,
            &bob,
            chain_id,
        );
        submit(&ledger, claim);
    }

    let mut produced = 0;
    while !stop.load(Ordering::Relaxed) && produced <= options.blocks {
        let (producer, policy) = if options.pos {
            (alice.address(), ProductionPolicy::ProofOfStake(alice.clone()))
        } else {
            (miner, ProductionPolicy::ProofOfWork)
        };
        produce(&ledger, producer, policy).await;
        produced += 1;
        sleep(options.interval).await;
    }

    for (name, address) in [
        ("alice", alice.address()),
        ("bob", bob.address()),
        ("faucet", faucet.address()),
        ("miner", miner),
    ] {
        let account = ledger.get_account(&address);
        info!(
            "{name}: balance={} nonce={} staked={} slashed={}",
            account.balance, account.nonce, account.staked, account.slashed
        );
    }
    if let Some(escrow) = escrow_id.and_then(|id| ledger.get_escrow(&id)) {
        info!("Escrow {}: status={:?} amount={}", escrow.id, escrow.status(), escrow.amount);
    }
    info!(
        "Blocks={} pending={} slashings={}",
        ledger.get_chain_summary().len(),
        ledger.pending_len(),
        ledger.slashing_records().len()
    );
    match ledger.validate_chain() {
        Ok(()) => info!("Chain valid: height={} tip={}", ledger.height(), ledger.tip().hash),
        Err(e) => error!("Chain replay failed: {e}"),
    }
}

fn build(
    payload: TxPayload,
    amount: u128,
    fee: u128,
    nonce: u64,
    key: &PrivateKey,
    chain_id: u64,
) -> Transaction {
    Transaction::builder(payload)
        .amount(amount)
        .fee(fee)
        .nonce(nonce)
        .sign(key, chain_id)
}

fn pay(from: &PrivateKey, to: Address, amount: u128, nonce: u64, chain_id: u64) -> Transaction {
    build(TxPayload::Pay { recipient: to }, amount, 1, nonce, from, chain_id)
}

fn submit(ledger: &Ledger, tx: Transaction) -> Option<remitchain::types::hash::Hash> {
    let kind = tx.kind();
    match ledger.submit_transaction(tx) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("{kind} transaction rejected: {e}");
            None
        }
    }
}

/// Runs block production on the blocking pool so mining does not stall the
/// runtime.
async fn produce(ledger: &Arc<Ledger>, producer: Address, policy: ProductionPolicy) -> Option<Block> {
    let ledger = Arc::clone(ledger);
    let result = tokio::task::spawn_blocking(move || ledger.produce_block(producer, policy)).await;
    match result {
        Ok(Ok(block)) => Some(block),
        Ok(Err(ConsensusError::Cancelled)) => {
            info!("Block production cancelled");
            None
        }
        Ok(Err(e)) => {
            warn!("Block production failed: {e}");
            None
        }
        Err(e) => {
            error!("Block production task failed: {e}");
            None
        }
    }
}

fn parse_args(args: &[String]) -> Options {
    let program = args.first().map(String::as_str).unwrap_or("remitchain");
    let mut options = Options {
        pos: false,
        difficulty: None,
        threads: None,
        interval: Duration::from_millis(500),
        blocks: 3,
        miner: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage(program);
                process::exit(0);
            }
            "--pos" => {
                options.pos = true;
                i += 1;
            }
            "--difficulty" => {
                options.difficulty = Some(flag_value(args, i));
                i += 2;
            }
            "--threads" => {
                options.threads = Some(flag_value(args, i));
                i += 2;
            }
            "--interval-ms" => {
                options.interval = Duration::from_millis(flag_value(args, i));
                i += 2;
            }
            "--miner" => {
                let raw: String = flag_value(args, i);
                let Some(address) = Address::from_hex(&raw) else {
                    eprintln!("Invalid miner address: {raw}");
                    process::exit(1);
                };
                options.miner = Some(address);
                i += 2;
            }
            "--blocks" => {
                options.blocks = flag_value(args, i);
                i += 2;
            }
            other => {
                eprintln!("Unexpected argument: {}\n", other);
                print_usage(program);
                process::exit(1);
            }
        }
    }
    options
}

/// Parses the argument following the flag at `i`, exiting on failure.
fn flag_value<T: std::str::FromStr>(args: &[String], i: usize) -> T {
    let Some(raw) = args.get(i + 1) else {
        eprintln!("{} requires an argument", args[i]);
        process::exit(1);
    };
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            eprintln!("Invalid value for {}: {}", args[i], raw);
            process::exit(1);
        }
    }
}

const USAGE: &str = "\
Remittance ledger demo

USAGE:
    {program} [OPTIONS]

OPTIONS:
    --pos                 Produce proof-of-stake blocks once alice has staked
    --difficulty <bits>   Proof-of-work difficulty in leading zero bits
    --threads <n>         Mining threads
    --interval-ms <ms>    Pause between blocks (default 500)
    --blocks <n>          Extra blocks after the remittance (default 3)
    --miner <address>     Address credited for mined blocks (default: faucet)
    -h, --help            Print this help message

ENVIRONMENT:
    REMITCHAIN_LOG    Minimum log level: debug, info, warn or error
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
