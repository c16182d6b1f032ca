//! Supervisor entry point — CLI wiring, socket setup, and the run loop.

use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::process;

use tracing::info;

use hvac_supervisor::config::SupervisorConfig;
use hvac_supervisor::control::{ApplianceScheduler, SetpointEngine};
use hvac_supervisor::coordinator::{FixedStepClock, TickCoordinator};
use hvac_supervisor::occupancy::OccupancyTimeline;
use hvac_supervisor::session::SimulationSession;

/// Seed offset between buildings so their activation draws are not
/// correlated.
const BUILDING_SEED_STRIDE: u64 = 57;

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<String>,
    seed_override: Option<u64>,
}

fn print_help() {
    eprintln!("hvac-supervisor — multi-building HVAC supervisory controller");
    eprintln!();
    eprintln!("Usage: hvac-supervisor [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>   Load supervisor configuration from TOML file");
    eprintln!("  --seed <u64>      Override the random seed");
    eprintln!("  --help            Show this help message");
    eprintln!();
    eprintln!("Without --config, built-in defaults with no buildings are used");
    eprintln!("(which fails validation; a config file is effectively required).");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        seed_override: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --config requires a path argument");
                    process::exit(1);
                }
                cli.config_path = Some(args[i].clone());
            }
            "--seed" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --seed requires a u64 argument");
                    process::exit(1);
                }
                if let Ok(s) = args[i].parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{}\" is not a valid u64", args[i]);
                    process::exit(1);
                }
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

/// Binds one listener per building and blocks until every simulator has
/// connected. Port assignment is `base_port + session index`.
fn accept_simulators(
    config: &SupervisorConfig,
) -> std::io::Result<Vec<(BufReader<TcpStream>, TcpStream)>> {
    let mut streams = Vec::with_capacity(config.buildings.len());
    for (index, building) in config.buildings.iter().enumerate() {
        let port = config.network.base_port + index as u16;
        let listener = TcpListener::bind((config.network.ip_address.as_str(), port))?;
        info!(building = %building.name, port, "waiting for simulator");
        let (stream, peer) = listener.accept()?;
        info!(building = %building.name, %peer, "simulator connected");
        let reader = BufReader::new(stream.try_clone()?);
        streams.push((reader, stream));
    }
    Ok(streams)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = parse_args();

    let mut config = match cli.config_path {
        Some(ref path) => match SupervisorConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        },
        None => match SupervisorConfig::from_toml_str("") {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        },
    };

    if let Some(seed) = cli.seed_override {
        config.simulation.seed = seed;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let timeline = match OccupancyTimeline::from_csv_file(
        Path::new(&config.simulation.occupancy_file),
        config.simulation.days,
        config.simulation.ticks_per_day(),
    ) {
        Ok(tl) if !tl.is_empty() => tl,
        Ok(_) => {
            eprintln!(
                "error: occupancy file \"{}\" contains no usable rows",
                config.simulation.occupancy_file
            );
            process::exit(1);
        }
        Err(e) => {
            eprintln!(
                "error: cannot load occupancy file \"{}\": {e}",
                config.simulation.occupancy_file
            );
            process::exit(1);
        }
    };
    let occupied_counts = timeline.daily_occupied_counts(config.simulation.ticks_per_day());
    info!(
        samples = timeline.len(),
        days = occupied_counts.len(),
        "occupancy data loaded"
    );

    let streams = match accept_simulators(&config) {
        Ok(streams) => streams,
        Err(e) => {
            eprintln!("error: socket setup failed: {e}");
            process::exit(1);
        }
    };

    let profiles = config.building_profiles();
    let sessions: Vec<_> = profiles
        .into_iter()
        .zip(streams)
        .enumerate()
        .map(|(index, (profile, (reader, writer)))| {
            let appliance = profile.dishwasher.then(|| {
                ApplianceScheduler::new(
                    config.appliance,
                    config.simulation.timesteps_per_hour,
                    &occupied_counts,
                    config
                        .simulation
                        .seed
                        .wrapping_add(index as u64 * BUILDING_SEED_STRIDE),
                )
            });
            SimulationSession::new(profile, reader, writer, appliance)
        })
        .collect();

    info!(sessions = sessions.len(), "all simulators connected, starting run");

    // One tick is one occupancy interval, in seconds of simulated time.
    let step_seconds = 3600.0 / config.simulation.timesteps_per_hour as f64;
    let coordinator = TickCoordinator::new(
        sessions,
        timeline,
        SetpointEngine::new(config.control),
        FixedStepClock::new(step_seconds),
        config.simulation.timesteps_per_hour,
    );

    coordinator.run();
    info!("supervisor run complete");
}
