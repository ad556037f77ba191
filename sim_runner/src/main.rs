//! Headless ski-jump round runner.

use std::path::PathBuf;

use ai_control::{AiControlSource, AiDifficulty};
use clap::Parser;
use hill_layout::{build_world, practice_hill, HillFile, ZoneSpec};
use jumper::{GateFrame, Jumper, JumperConfig, RunObserver, RunSummary};
use rapier3d::math::Vector;
use rapier3d::prelude::Real;
use round::{NullSwitch, Peripherals, RoundConfig, RoundOrchestrator};
use scoring::{LandingScorer, RunTotal, ScorerConfig, ScoringZone};
use tracing::info;
use tracing_subscriber::EnvFilter;

const EXIT_SUCCESS: i32 = 0;
const EXIT_HILL: i32 = 10;
const EXIT_TICK_CAP: i32 = 11;

const DT: Real = 1.0 / 60.0;

#[derive(Parser)]
#[command(name = "sim_runner", version, about = "Headless ski-jump round runner")]
struct Cli {
    /// Hill description file; the built-in practice hill when omitted.
    #[arg(long, value_name = "PATH")]
    hill: Option<PathBuf>,

    #[arg(long, default_value_t = 3)]
    attempts: u32,

    /// Seed for the automated jumper.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Safety cap on simulated ticks.
    #[arg(long, default_value_t = 120_000)]
    max_ticks: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

struct ConsoleObserver;

impl RunObserver for ConsoleObserver {
    fn attempt_finished(&mut self, summary: &RunSummary) {
        info!(
            distance = summary.distance,
            flight_time = summary.flight_time,
            grade = ?summary.grade,
            seed = summary.seed,
            "touched down"
        );
    }
}

fn zone_from_spec(spec: &ZoneSpec) -> ScoringZone {
    ScoringZone {
        center: Vector::new(spec.center[0], spec.center[1], spec.center[2]),
        radius: spec.radius,
        points: spec.points,
    }
}

fn run(cli: Cli) -> i32 {
    let hill = match &cli.hill {
        Some(path) => match HillFile::load(path) {
            Ok(hill) => hill,
            Err(err) => {
                eprintln!("failed to load hill {}: {}", path.display(), err);
                return EXIT_HILL;
            }
        },
        None => practice_hill(),
    };
    info!(name = %hill.name, solids = hill.solids.len(), zones = hill.zones.len(), "hill loaded");

    let mut world = build_world(&hill);
    let gate = GateFrame {
        position: hill.gate_position(),
        rotation: hill.gate_rotation(),
    };
    let config = JumperConfig {
        seat_offset: hill.seat_offset(),
        seat_yaw: hill.gate.seat_yaw_deg.to_radians(),
        ..Default::default()
    };
    let mut jumper = Jumper::new(config, gate);
    let zones = hill.zones.iter().map(zone_from_spec).collect();
    let mut scorer = LandingScorer::new(ScorerConfig::default(), zones);
    let mut total = RunTotal::default();
    let mut orchestrator = RoundOrchestrator::new(RoundConfig {
        max_attempts: cli.attempts,
        ..Default::default()
    });
    let mut source = AiControlSource::new(AiDifficulty {
        seed: cli.seed,
        ..Default::default()
    });
    let mut observer = ConsoleObserver;
    let mut input = NullSwitch;
    let mut camera = NullSwitch;

    orchestrator.start_round(&mut total);
    let mut ticks = 0u64;
    while !orchestrator.is_finished() && ticks < cli.max_ticks {
        world.step(DT);
        let mut peripherals = Peripherals {
            input: &mut input,
            camera: &mut camera,
        };
        orchestrator.step(
            &world,
            &mut jumper,
            &mut source,
            &mut scorer,
            &mut total,
            &mut peripherals,
            &mut observer,
            DT,
        );
        ticks += 1;
    }
    if !orchestrator.is_finished() {
        eprintln!("tick cap of {} reached before the round finished", cli.max_ticks);
        return EXIT_TICK_CAP;
    }

    for record in orchestrator.records() {
        println!(
            "attempt {}: {} points (settled in {:.2}s)",
            record.attempt, record.points, record.braking_wait
        );
    }
    println!("round total: {} points", total.total());
    EXIT_SUCCESS
}
