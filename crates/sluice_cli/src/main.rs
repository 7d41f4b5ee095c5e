//! SLUICE CLI
//!
//! Runs reporting rounds against a JSON world file and a redb round cache.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use serde::Serialize;
use sluice_core::{ActivationIndex, Timestamp, Wei, WorkerStatus};
use sluice_runtime::{EngineConfig, MemoryWorld, RoundContext, RoundEngine, RoundOutcome, World};
use sluice_storage::{CacheStore, RedbStore, RoundCache};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "SLUICE - withdrawal finalization and exit scheduling oracle", long_about = None)]
struct Cli {
    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one round
    Round {
        #[command(flatten)]
        round: RoundArgs,
        /// Plan without emitting or committing
        #[arg(long)]
        dry_run: bool,
    },
    /// Run rounds on an interval
    Watch {
        #[command(flatten)]
        round: RoundArgs,
        /// Seconds between rounds
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
        /// Stop after this many rounds
        #[arg(long)]
        rounds: Option<u64>,
    },
    /// Print the round cache
    Inspect {
        /// Round cache database
        #[arg(short, long)]
        cache: PathBuf,
        /// Engine configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the default configuration
    Config,
}

#[derive(Args)]
struct RoundArgs {
    /// World state file (JSON)
    #[arg(short, long)]
    world: PathBuf,
    /// Round cache database
    #[arg(short, long)]
    cache: PathBuf,
    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Block to report against; defaults to the world's block number
    #[arg(long)]
    reference_block: Option<u64>,
    /// Round time in unix seconds; defaults to the world's clock, then now
    #[arg(long)]
    now: Option<u64>,
    /// Suspect slashing: count only withdrawal credentials
    #[arg(long)]
    slashing: bool,
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::from_json_file(path)?),
        None => Ok(EngineConfig::default()),
    }
}

impl RoundArgs {
    fn context(&self, world: &World) -> RoundContext {
        let now = match (self.now, world.clock.as_secs()) {
            (Some(secs), _) => Timestamp::from_secs(secs),
            (None, 0) => Timestamp::now(),
            (None, _) => world.clock,
        };
        let reference_block = self
            .reference_block
            .or((world.block_number > 0).then_some(world.block_number));
        RoundContext {
            now,
            reference_block,
            total_pooled_ether: world.total_pooled_ether,
            total_shares: world.total_shares,
            slashing_suspected: self.slashing,
        }
    }
}

/// Summary printed by `inspect`
#[derive(Serialize)]
struct CacheSummary<'a> {
    expected_inflow_now: Wei,
    interrupted_commit: bool,
    /// RFC 3339 time after which each requested exit stops counting
    exit_deadlines: BTreeMap<ActivationIndex, String>,
    cache: &'a RoundCache,
}

impl<'a> CacheSummary<'a> {
    fn new(cache: &'a RoundCache, config: &EngineConfig, now: Timestamp) -> Self {
        let exit_deadlines = cache
            .pending_exits
            .iter()
            .filter_map(|(index, entry)| match entry.status {
                WorkerStatus::ExitRequested { at } => Some((
                    *index,
                    at.add(config.inflow.exit_request_timeout).to_rfc3339(),
                )),
                _ => None,
            })
            .collect();
        Self {
            expected_inflow_now: cache.expected_inflow(now, &config.inflow),
            interrupted_commit: cache.journal.is_some(),
            exit_deadlines,
            cache,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sluice=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_world(path: &Path) -> Result<World> {
    let json = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading world file {}", path.display()))?;
    serde_json::from_str(&json).wrap_err_with(|| format!("parsing world file {}", path.display()))
}

fn write_world(path: &Path, world: &World) -> Result<()> {
    let json = serde_json::to_string_pretty(world)?;
    std::fs::write(path, json).wrap_err_with(|| format!("writing world file {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_engine(args: &RoundArgs, world: &Arc<MemoryWorld>) -> Result<RoundEngine> {
    let config = load_config(args.config.as_deref())?;
    let store: Arc<dyn CacheStore> = Arc::new(
        RedbStore::open(&args.cache)
            .wrap_err_with(|| format!("opening round cache {}", args.cache.display()))?,
    );
    Ok(RoundEngine::new(config, world.collaborators(), store)?)
}

/// Load the world file into `world` and build this round's context.
///
/// The round time is stamped onto the in-memory world only; the file keeps
/// its own clock so a zero clock keeps tracking wall time.
fn refresh(args: &RoundArgs, world: &MemoryWorld) -> Result<(RoundContext, Timestamp)> {
    let mut loaded = read_world(&args.world)?;
    let file_clock = loaded.clock;
    let ctx = args.context(&loaded);
    loaded.clock = ctx.now;
    world.update(|w| *w = loaded);
    Ok((ctx, file_clock))
}

fn write_back(args: &RoundArgs, world: &MemoryWorld, file_clock: Timestamp) -> Result<()> {
    let mut snapshot = world.snapshot();
    snapshot.clock = file_clock;
    write_world(&args.world, &snapshot)
}

async fn round(args: RoundArgs, dry_run: bool) -> Result<()> {
    let world = Arc::new(MemoryWorld::default());
    let (ctx, file_clock) = refresh(&args, &world)?;
    let mut engine = open_engine(&args, &world)?;

    let outcome = if dry_run {
        engine.dry_run(&ctx).await?
    } else {
        let outcome = engine.run_round(&ctx).await;
        // Sink effects are real even when the commit fails part way
        write_back(&args, &world, file_clock)?;
        outcome?
    };
    print_json(&outcome)
}

async fn watch(args: RoundArgs, interval_secs: u64, rounds: Option<u64>) -> Result<()> {
    if interval_secs == 0 {
        return Err(eyre!("--interval-secs must be positive"));
    }
    let world = Arc::new(MemoryWorld::default());
    refresh(&args, &world)?;
    let mut engine = open_engine(&args, &world)?;
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    let mut completed = 0u64;

    info!(interval_secs, world = %args.world.display(), "watching");
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Ok(());
            }
        }

        let (ctx, file_clock) = refresh(&args, &world)?;
        let result = engine.run_round(&ctx).await;
        write_back(&args, &world, file_clock)?;
        match result {
            Ok(outcome) => report(&outcome),
            Err(err) if err.is_fatal() => {
                error!(%err, "stopping");
                return Err(err.into());
            }
            Err(err) => warn!(%err, "round failed, retrying next tick"),
        }

        completed += 1;
        if rounds.is_some_and(|limit| completed >= limit) {
            return Ok(());
        }
    }
}

fn report(outcome: &RoundOutcome) {
    info!(
        round = outcome.round,
        digest = %outcome.digest,
        available = %outcome.liquidity.available,
        finalized = outcome.plan.finalize.as_ref().map_or(0, |b| b.count),
        exits = outcome.plan.exits.selected.len(),
        pending = outcome.cache.pending_exits.len(),
        "round done"
    );
}

fn inspect(cache: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let store = RedbStore::open(cache)
        .wrap_err_with(|| format!("opening round cache {}", cache.display()))?;
    let cache = store.load()?;
    print_json(&CacheSummary::new(&cache, &config, Timestamp::now()))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Round { round: args, dry_run } => round(args, dry_run).await,
        Commands::Watch {
            round: args,
            interval_secs,
            rounds,
        } => watch(args, interval_secs, rounds).await,
        Commands::Inspect { cache, config } => inspect(&cache, config.as_deref()),
        Commands::Config => print_json(&EngineConfig::default()),
    }
}
