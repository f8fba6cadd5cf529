//! # Physical World Producer
//!
//! Drives a scripted kinematic world and streams its state to the relay.
//!
//! ## Usage
//!
//! ```bash
//! physical_world --relay 127.0.0.1:8999 --vehicles 20 --walkers 5
//! ```

use gemini_sync::{KinematicWorld, PoseLog, SourceConfig, StateSource, SyncConfig};
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut relay_addr: Option<String> = None;
    let mut vehicles = 20usize;
    let mut walkers = 0usize;
    let mut duration_secs: Option<u64> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--relay" | "-r" => {
                if i + 1 < args.len() {
                    relay_addr = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--vehicles" | "-n" => {
                if i + 1 < args.len() {
                    vehicles = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--walkers" | "-w" => {
                if i + 1 < args.len() {
                    walkers = args[i + 1].parse().unwrap_or(0);
                    i += 1;
                }
            }
            "--duration" | "-d" => {
                if i + 1 < args.len() {
                    duration_secs = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: physical_world [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>     TOML configuration file");
                println!("  -r, --relay <ADDR>      Relay address to dial");
                println!("  -n, --vehicles <NUM>    Scripted vehicles (default: 20)");
                println!("  -w, --walkers <NUM>     Scripted walkers (default: 0)");
                println!("  -d, --duration <SECS>   Stream for N seconds then exit");
                println!("  -h, --help              Show this help");
                return;
            }
            _ => {}
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => match SyncConfig::from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load {path}: {e}");
                std::process::exit(1);
            }
        },
        None => SyncConfig::default(),
    };
    let relay_addr = relay_addr.unwrap_or_else(|| config.relay_addr.clone());

    println!("╔══════════════════════════════════════════════╗");
    println!("║        GEMINI PHYSICAL WORLD                 ║");
    println!("╚══════════════════════════════════════════════╝");
    println!("relay:    {relay_addr}");
    println!("roster:   {vehicles} vehicles, {walkers} walkers");
    println!();

    let mut world = KinematicWorld::new();
    let placed = world.populate(vehicles, walkers);
    if placed < vehicles + walkers {
        eprintln!("spawn capacity reached: placed {placed} of {}", vehicles + walkers);
    }

    let source_config = SourceConfig {
        relay_addr,
        tick_interval: config.tick_interval(),
        run_for: duration_secs.map(Duration::from_secs),
    };
    let mut source = StateSource::new(world, source_config);
    if !config.physical_pose_log.is_empty() {
        match PoseLog::create(&config.physical_pose_log) {
            Ok(log) => source = source.with_pose_log(log),
            Err(e) => eprintln!("pose log disabled ({}): {e}", config.physical_pose_log),
        }
    }

    match source.run() {
        Ok(frames) => println!("done: {frames} frames sent"),
        Err(e) => {
            eprintln!("producer failed: {e}");
            std::process::exit(1);
        }
    }
}
