//! Roulette engine simulator
//!
//! Drives the engine with simulated players in one room and prints the
//! resulting outcome distribution and balances.

use clap::{Parser, Subcommand};
use roulette_engine::{
    config::{generate_sample_config, ConfigLoader},
    errors::EngineResult,
    roulette::{outcome::longest_color_run, Color, OutcomeGenerator, Wheel},
    session::WheelFactory,
    EngineConfig, RoomId, SpinCoordinator, UserId,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "roulette-sim")]
#[command(about = "Simulate chat roulette rounds against the engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Play simulated rounds in one room
    Simulate {
        /// Number of spins to run
        #[arg(short, long, default_value = "1000")]
        spins: usize,

        /// Number of simulated players
        #[arg(short, long, default_value = "5")]
        players: i64,

        /// Starting balance per player
        #[arg(short, long, default_value = "100000")]
        balance: i64,

        /// Seed for the wheel and the players' choices
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Write a sample configuration file
    SampleConfig {
        #[arg(short, long, default_value = "roulette.toml")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> EngineResult<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "roulette_engine=debug,roulette_sim=debug"
    } else {
        "roulette_engine=info,roulette_sim=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Commands::Simulate {
            spins,
            players,
            balance,
            seed,
        } => {
            let mut loader = ConfigLoader::new();
            if let Some(path) = &cli.config {
                loader = loader.with_path(path);
            }
            let mut config = loader.load()?;
            // The simulator triggers spins back to back
            config.anti_flood.min_interval_ms = 0;
            config.anti_flood.max_spins_per_minute = 0;
            config.spin_limit.daily_limit = 0;
            run_simulation(config, spins, players, balance, seed).await?;
            Ok(())
        }
        Commands::SampleConfig { path } => {
            generate_sample_config(&path)?;
            info!(path = %path, "Sample configuration written");
            Ok(())
        }
    }
}

/// What a simulation run observed
#[derive(Debug)]
struct SimulationSummary {
    spins_played: usize,
    longest_streak: usize,
}

async fn run_simulation(
    config: EngineConfig,
    spins: usize,
    players: i64,
    balance: i64,
    seed: u64,
) -> EngineResult<SimulationSummary> {
    let wheel_config = config.wheel.clone();
    let wheels: WheelFactory = Arc::new(move |room: RoomId| {
        Box::new(OutcomeGenerator::seeded(&wheel_config, seed ^ room.0 as u64)) as Box<dyn Wheel>
    });
    let game_log = roulette_engine::game_log::InMemoryGameLog::new(config.session.history_window);
    let engine = SpinCoordinator::with_wheels(
        config,
        Arc::new(roulette_engine::ledger::InMemoryLedger::with_balances(
            (1..=players).map(|p| (UserId(p), balance)),
        )),
        Arc::new(game_log),
        Arc::new(roulette_engine::limits::InMemorySpinLimitStore::new()),
        wheels,
    );

    let room = RoomId(1);
    let bet_texts = ["100 red", "100 black", "50 0", "200 q2", "100 7", "150 3-8", "100 green"];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut numbers: BTreeMap<u8, usize> = BTreeMap::new();
    let mut colors: Vec<Color> = Vec::with_capacity(spins);

    info!(spins, players, balance, seed, "Starting simulation");
    for _ in 0..spins {
        for player in 1..=players {
            let text = bet_texts.choose(&mut rng).copied().unwrap_or("100 red");
            if let Err(e) = engine.place_bets(UserId(player), room, text).await {
                warn!(player, error = %e, "Bet rejected");
            }
        }

        match engine.spin(UserId(1), room).await {
            Ok(report) => {
                *numbers.entry(report.outcome.number).or_default() += 1;
                colors.push(report.outcome.color);
            }
            Err(e) => {
                warn!(error = %e, "Spin refused, stopping");
                break;
            }
        }
    }

    let summary = SimulationSummary {
        spins_played: colors.len(),
        longest_streak: longest_color_run(colors.iter().copied()),
    };
    println!("Spins played: {}", summary.spins_played);
    println!("Longest color streak: {}", summary.longest_streak);
    for (number, count) in &numbers {
        println!("  {:>2}: {}", number, count);
    }
    for player in 1..=players {
        let stats = engine.stats(UserId(player)).await?;
        println!(
            "Player {}: balance {}, won {}, lost {}",
            player,
            engine.balance(UserId(player)).await?,
            stats.total_won,
            stats.total_lost
        );
    }
    Ok(summary)
}
