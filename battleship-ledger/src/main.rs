//! Battleship Ledger Node
//!
//! Runs a block-producing ledger and plays one demo match between two
//! local orchestrators with random fleets.

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use battleship::client::{MatchResult, Orchestrator};
use battleship::network::LedgerNode;
use battleship::{AccountId, Balance, InMemoryLedger, Ledger, NodeConfig, SecretBoard, VERSION};

const DEMO_FUNDS: Balance = 10_000;
const DEMO_STAKE: Balance = 1_000;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = NodeConfig::from_env();

    info!("Battleship Ledger v{}", VERSION);
    info!(
        "Block interval: {} ms, turn timeout: {} blocks, abandon timeout: {} blocks",
        config.block_interval.as_millis(),
        config.arbiter.turn_timeout,
        config.arbiter.abandon_timeout
    );

    let turn_timeout = config.arbiter.turn_timeout;
    let (node, handle) = LedgerNode::new(config, InMemoryLedger::new()).context("invalid configuration")?;
    let node_task = node.spawn();

    let alice = AccountId::generate();
    let bob = AccountId::generate();
    handle.deposit(alice, DEMO_FUNDS).await?;
    handle.deposit(bob, DEMO_FUNDS).await?;

    info!("=== Starting Demo Match ===");
    info!("Player 1: {}", alice.to_uuid_string());
    info!("Player 2: {}", bob.to_uuid_string());

    let mut p1 = Orchestrator::connect(handle.clone(), alice, turn_timeout).await?;
    let mut p2 = Orchestrator::connect(handle.clone(), bob, turn_timeout).await?;

    let id = p1.create(DEMO_STAKE).await?;
    p2.join(id, DEMO_STAKE).await?;
    p1.sync().await?;

    let (board1, board2) = {
        let mut rng = rand::thread_rng();
        (SecretBoard::random(&mut rng), SecretBoard::random(&mut rng))
    };
    info!("Player 1 root: {}", hex::encode(board1.root()));
    info!("Player 2 root: {}", hex::encode(board2.root()));

    p1.commit(board1).await?;
    p2.commit(board2).await?;

    let (r1, r2) = tokio::join!(p1.play(), p2.play());
    let (r1, r2) = (r1?, r2?);

    info!("=== Match Results ===");
    for (name, state, result) in [("Player 1", p1.state(), &r1), ("Player 2", p2.state(), &r2)] {
        info!("{}: {:?} after {} shots, {} hits", name, result, state.shots().len(), state.hits());
    }

    info!("Player 1 balance: {}", handle.balance(alice).await?);
    info!("Player 2 balance: {}", handle.balance(bob).await?);

    handle.shutdown();
    let ledger = node_task.await.context("ledger node panicked")?;

    info!(
        "Final height {}, live matches {}, escrowed {}, burned {}",
        ledger.current_height(),
        ledger.match_count(),
        ledger.total_escrowed(),
        ledger.total_burned()
    );

    if !matches!(
        (&r1, &r2),
        (MatchResult::Won { .. }, MatchResult::Lost { .. }) | (MatchResult::Lost { .. }, MatchResult::Won { .. })
    ) {
        bail!("demo match ended without a winner: {:?} / {:?}", r1, r2);
    }

    Ok(())
}
