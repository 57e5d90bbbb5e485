//! Plaza - headless simulation runner
//!
//! Runs the agent simulation without a renderer. Fast mode advances a
//! virtual clock as quickly as possible and prints a summary; realtime mode
//! runs the async runtime on wall-clock time and streams events.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use plaza_sim::core::error::Result;
use plaza_sim::core::SimulationConfig;
use plaza_sim::simulation::{apply_outcome, Collaborators, SimState, SimulationClock, SimulationEvent, SimulationRuntime};
use plaza_sim::world::demo::demo_world;
use plaza_sim::world::loader::load_from_file;
use tokio::runtime::Runtime;

/// Headless Plaza runner
#[derive(Parser, Debug)]
#[command(name = "plaza")]
#[command(about = "Run the plaza agent simulation without a renderer")]
struct Args {
    /// World definition JSON (defaults to the built-in demo town)
    #[arg(long)]
    world: Option<PathBuf>,

    /// Simulation config TOML (defaults to built-in values)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated seconds to run
    #[arg(long, default_value_t = 120)]
    seconds: u64,

    /// Random seed; overrides the config's seed
    #[arg(long)]
    seed: Option<u64>,

    /// Run on wall-clock time through the async runtime
    #[arg(long)]
    realtime: bool,

    /// Print every event as a JSON line
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("plaza_sim=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let world = match &args.world {
        Some(path) => load_from_file(path)?,
        None => demo_world(),
    };

    let collaborators = Collaborators::from_config(&config.effects);
    let state = world.into_state(config)?;
    let rt = Runtime::new()?;

    if args.realtime {
        rt.block_on(run_realtime(state, collaborators, &args))
    } else {
        run_fast(state, collaborators, &rt, &args)
    }
}

/// Advance a virtual clock frame by frame; effects are awaited inline
fn run_fast(mut state: SimState, collaborators: Collaborators, rt: &Runtime, args: &Args) -> Result<()> {
    let frame = state.config.clock.min_frame_delta_ms.max(1);
    let end = args.seconds * 1_000;
    let mut clock = SimulationClock::new(&state.config.clock, 0);
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    let mut now = 0;
    while now <= end {
        let mut events = clock.advance(&mut state, now);
        for request in state.drain_outbox() {
            let outcome = rt.block_on(collaborators.perform(request));
            events.extend(apply_outcome(&mut state, outcome, now));
        }
        for event in &events {
            record(&mut counts, event, args.verbose)?;
        }
        now += frame;
    }

    println!("\n=== {} simulated seconds, {} ticks ===", args.seconds, state.tick);
    for (kind, count) in &counts {
        println!("  {:<22} {}", kind, count);
    }
    println!();
    for agent in state.roster.iter() {
        let task = agent
            .current_task
            .as_ref()
            .map(|t| t.kind().as_str())
            .unwrap_or("idle");
        println!(
            "  {:<10} ({:>6.1}, {:>6.1}) in {:<8} {}",
            agent.name, agent.position.x, agent.position.y, agent.room_id, task
        );
    }
    Ok(())
}

async fn run_realtime(state: SimState, collaborators: Collaborators, args: &Args) -> Result<()> {
    let (handle, task) = SimulationRuntime::spawn(state, collaborators);
    let mut events = handle.subscribe();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            received = events.recv() => match received {
                Ok(event) => record(&mut counts, &event, args.verbose)?,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event stream lagged by {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown().await?;
    if let Err(e) = task.await {
        tracing::warn!("Runtime task ended abnormally: {}", e);
    }

    let snapshot = handle.snapshot();
    println!("\n=== {} seconds realtime, {} ticks ===", args.seconds, snapshot.tick);
    for (kind, count) in &counts {
        println!("  {:<22} {}", kind, count);
    }
    Ok(())
}

fn record(counts: &mut BTreeMap<String, usize>, event: &SimulationEvent, verbose: bool) -> Result<()> {
    let json = serde_json::to_value(event)?;
    let kind = json
        .get("event")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    *counts.entry(kind).or_insert(0) += 1;
    if verbose {
        println!("{}", json);
    }
    Ok(())
}
