//! # Twin World Consumer
//!
//! Receives the forwarded snapshot stream and reconciles it into a twin
//! world: create on first sighting, update on every later one, collision
//! counts debounced, summary written at shutdown.
//!
//! ## Usage
//!
//! ```bash
//! twin_world --listen 0.0.0.0:9999
//! ```

use gemini_sync::{
    write_collision_summary, KinematicWorld, PoseLog, Reconciler, SyncConfig,
};
use std::net::TcpListener;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut listen_addr: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--listen" | "-l" => {
                if i + 1 < args.len() {
                    listen_addr = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: twin_world [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>   TOML configuration file");
                println!("  -l, --listen <ADDR>   Listen address (default: 0.0.0.0:9999)");
                println!("  -h, --help            Show this help");
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
    let listen_addr = listen_addr.unwrap_or_else(|| config.twin_listen.clone());

    println!("╔══════════════════════════════════════════════╗");
    println!("║        GEMINI TWIN WORLD                     ║");
    println!("╚══════════════════════════════════════════════╝");
    println!("listen:   {listen_addr}");
    println!();

    let listener = match TcpListener::bind(&listen_addr) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("cannot listen on {listen_addr}: {e}");
            std::process::exit(1);
        }
    };

    let mut reconciler = Reconciler::new(KinematicWorld::new(), config.collision_window());
    if !config.twin_pose_log.is_empty() {
        match PoseLog::create(&config.twin_pose_log) {
            Ok(log) => reconciler = reconciler.with_pose_log(log),
            Err(e) => eprintln!("pose log disabled ({}): {e}", config.twin_pose_log),
        }
    }

    let served = reconciler.serve(&listener);

    // Observation sinks and teardown run on every exit path.
    let summary = reconciler.collision_summary();
    if !config.collision_summary.is_empty() {
        if let Err(e) = write_collision_summary(&config.collision_summary, &summary) {
            eprintln!("collision summary not written: {e}");
        }
    }
    println!("collisions: {} entities involved", summary.len());
    for (id, count) in &summary {
        println!("  entity {id}: {count}");
    }
    reconciler.shutdown();

    if let Err(e) = served {
        eprintln!("twin world stream failed: {e}");
        std::process::exit(1);
    }
    println!("done: twin world torn down cleanly");
}
