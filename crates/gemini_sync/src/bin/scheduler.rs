//! # Scheduler
//!
//! The relay between the physical and twin worlds: one producer in, one
//! consumer out, frames forwarded in order.
//!
//! ## Usage
//!
//! ```bash
//! scheduler --listen 0.0.0.0:8999 --forward 127.0.0.1:9999 --max-runtime 600
//! ```

use gemini_sync::{Relay, RelayConfig, SyncConfig};
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut listen_addr: Option<String> = None;
    let mut forward_addr: Option<String> = None;
    let mut max_runtime_secs: Option<u64> = None;

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
            "--forward" | "-f" => {
                if i + 1 < args.len() {
                    forward_addr = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--max-runtime" | "-m" => {
                if i + 1 < args.len() {
                    max_runtime_secs = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: scheduler [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>        TOML configuration file");
                println!("  -l, --listen <ADDR>        Producer listen address");
                println!("  -f, --forward <ADDR>       Consumer address to dial");
                println!("  -m, --max-runtime <SECS>   Liveness bound (default: 600)");
                println!("  -h, --help                 Show this help");
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
    let mut relay_config: RelayConfig = config.relay_config();
    if let Some(addr) = listen_addr {
        relay_config.listen_addr = addr;
    }
    if let Some(addr) = forward_addr {
        relay_config.forward_addr = addr;
    }
    if let Some(secs) = max_runtime_secs {
        relay_config.max_runtime = Duration::from_secs(secs);
    }

    println!("╔══════════════════════════════════════════════╗");
    println!("║        GEMINI SCHEDULER                      ║");
    println!("╚══════════════════════════════════════════════╝");
    println!("listen:   {}", relay_config.listen_addr);
    println!("forward:  {}", relay_config.forward_addr);
    println!("runtime:  {}s", relay_config.max_runtime.as_secs());
    println!();

    let relay = match Relay::bind(relay_config) {
        Ok(relay) => relay,
        Err(e) => {
            eprintln!("cannot listen: {e}");
            std::process::exit(1);
        }
    };
    match relay.run() {
        Ok(stats) => {
            println!(
                "done: {} frames forwarded, {} deltas gated, shutdown frame {}",
                stats.frames_forwarded,
                stats.deltas_gated,
                if stats.shutdown_sent { "delivered" } else { "not delivered" }
            );
        }
        Err(e) => {
            // Unreachable consumer lands here: fatal before any frame moved.
            eprintln!("relay failed: {e}");
            std::process::exit(1);
        }
    }
}
