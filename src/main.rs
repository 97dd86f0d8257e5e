mod simulation;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{error, info};
use std::path::PathBuf;
use std::time::Duration;

use simulation::{
    FixedCyclePolicy, ManualPolicy, Policy, QueuePressurePolicy, RandomPolicy, SimConfig,
    SimWorld,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyKind {
    /// Serve the configuration with the most queued vehicles
    Pressure,
    /// Round-robin through every green configuration
    Cycle,
    /// Uniformly random configuration each decision
    Random,
    /// Hold whatever the lights currently show
    Manual,
}

#[derive(Parser)]
#[command(name = "intersection_sim")]
#[command(about = "Signalized intersection simulation for traffic light control")]
struct Cli {
    /// Number of episodes to run
    #[arg(long, default_value = "1")]
    episodes: u32,

    /// Time delta per tick in seconds
    #[arg(long)]
    delta: Option<f32>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// JSON config file; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Signal policy driving the lights
    #[arg(long, value_enum, default_value_t = PolicyKind::Pressure)]
    policy: PolicyKind,

    /// Override the maximum episode length in seconds
    #[arg(long)]
    episode_time: Option<f32>,

    /// Simulated seconds per wall-clock second when running in real time
    #[arg(long)]
    time_scale: Option<f32>,

    /// Pace ticks against the wall clock
    #[arg(long)]
    realtime: bool,

    /// Print the summary and map every simulated second
    #[arg(long)]
    map: bool,

    /// Print final metrics as JSON on stdout
    #[arg(long)]
    metrics_json: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        error!("Simulation failed: {:#}", err);
        std::process::exit(1);
    }
}

fn build_config(cli: &Cli) -> Result<SimConfig> {
    let mut config = match &cli.config {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if let Some(delta) = cli.delta {
        config.tick_delta = delta;
    }
    if let Some(episode_time) = cli.episode_time {
        config.controller.max_episode_time = episode_time;
    }
    if let Some(time_scale) = cli.time_scale {
        config.time_scale = time_scale;
    }
    config.validate()?;
    Ok(config)
}

fn make_policy(kind: PolicyKind, seed: u64) -> Box<dyn Policy> {
    match kind {
        PolicyKind::Pressure => Box::new(QueuePressurePolicy::default()),
        PolicyKind::Cycle => Box::new(FixedCyclePolicy::new()),
        PolicyKind::Random => Box::new(RandomPolicy::new(seed.wrapping_add(1))),
        PolicyKind::Manual => Box::new(ManualPolicy::new()),
    }
}

/// Run the simulation in headless mode (no graphics)
fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    let delta = config.tick_delta;
    let time_scale = config.time_scale;

    let mut world = SimWorld::new(config)?;
    let policy = make_policy(cli.policy, world.seed());
    world.set_policy(policy);

    info!(
        "Running intersection simulation: {} episode(s), delta {}s, policy {}, seed {}",
        cli.episodes,
        delta,
        world.policy().name(),
        world.seed()
    );

    // Calculate how many ticks equal 1 second of simulation time
    let ticks_per_second = (1.0 / delta).ceil() as u32;

    let mut total_completed = 0;
    let mut total_accidents = 0;
    let mut total_reward = 0.0;
    let mut early_stops = 0;

    for _ in 0..cli.episodes {
        world.begin_episode();
        if cli.map {
            world.print_summary();
            world.draw_map();
        }

        let mut tick = 0u32;
        while world.is_running() {
            world.tick(delta);
            tick += 1;

            if cli.realtime {
                std::thread::sleep(Duration::from_secs_f32(delta / time_scale));
            }
            if cli.map && tick % ticks_per_second == 0 {
                println!(
                    "--- After tick {} ({:.1}s simulated time) ---",
                    tick,
                    tick as f32 * delta
                );
                world.print_summary();
                world.draw_map();
            }
        }

        if let Some(summary) = world.last_summary() {
            simulation::log_episode(summary);
            total_completed += summary.completions;
            total_accidents += summary.accidents;
            total_reward += summary.cumulative_reward;
            if summary.reason.is_early_stop() {
                early_stops += 1;
            }
        }
    }

    let metrics = world.metrics();
    info!("=== SIMULATION COMPLETE ===");
    info!("Episodes: {}", cli.episodes);
    info!("Early stops: {}", early_stops);
    info!("Total vehicles spawned: {}", metrics.total_spawned);
    info!("Total vehicles completed: {}", total_completed);
    info!("Accidents: {}", total_accidents);
    info!("Average wait: {:.2}s", metrics.average_wait);
    info!("Peak anger: {:.2}", metrics.anger.peak);
    info!("Cumulative reward: {:.3}", total_reward);

    if cli.metrics_json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    }
    Ok(())
}
