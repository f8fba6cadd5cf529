//! # State Bridge
//!
//! The publish/subscribe ingress: accepts raw JSON producers over TCP,
//! fans records out by vehicle id through the broker, and reconciles the
//! subscribed stream into sessions with idle-timeout eviction.
//!
//! ## Usage
//!
//! ```bash
//! state_bridge --listen 127.0.0.1:5005 --drop 0.1 --delay-ms 150
//! ```

use crossbeam_channel::RecvTimeoutError;
use gemini_sync::{
    classify, Broker, KinematicWorld, LifecycleSweeper, PubSubBridge, SessionRegistry, SyncConfig,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut listen_addr: Option<String> = None;
    let mut topic_prefix: Option<String> = None;
    let mut drop_probability: Option<f64> = None;
    let mut delay_ms: Option<u64> = None;
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
            "--listen" | "-l" => {
                if i + 1 < args.len() {
                    listen_addr = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--prefix" | "-p" => {
                if i + 1 < args.len() {
                    topic_prefix = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--drop" => {
                if i + 1 < args.len() {
                    drop_probability = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--delay-ms" => {
                if i + 1 < args.len() {
                    delay_ms = args[i + 1].parse().ok();
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
                println!("Usage: state_bridge [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>    TOML configuration file");
                println!("  -l, --listen <ADDR>    Producer listen address");
                println!("  -p, --prefix <TOPIC>   Topic prefix (default: gemini/vehicles)");
                println!("      --drop <PROB>      Injected loss for archetype-less records");
                println!("      --delay-ms <MS>    Injected delay before each publish");
                println!("  -d, --duration <SECS>  Run for N seconds then exit");
                println!("  -h, --help             Show this help");
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
    let mut bridge_config = config.bridge_config();
    if let Some(addr) = listen_addr {
        bridge_config.listen_addr = addr;
    }
    if let Some(prefix) = topic_prefix {
        bridge_config.topic_prefix = prefix;
    }
    if let Some(probability) = drop_probability {
        bridge_config.drop_probability = probability;
    }
    if let Some(ms) = delay_ms {
        bridge_config.injected_delay = Duration::from_millis(ms);
    }
    let prefix = bridge_config.topic_prefix.clone();

    println!("╔══════════════════════════════════════════════╗");
    println!("║        GEMINI STATE BRIDGE                   ║");
    println!("╚══════════════════════════════════════════════╝");
    println!("listen:   {}", bridge_config.listen_addr);
    println!("topics:   {prefix}/<car_id>");
    println!("loss:     {} (archetype-less records only)", bridge_config.drop_probability);
    println!("delay:    {:?}", bridge_config.injected_delay);
    println!();

    let broker = Broker::new();
    let bridge = match PubSubBridge::bind(bridge_config, broker.clone()) {
        Ok(bridge) => bridge,
        Err(e) => {
            eprintln!("bridge failed to bind: {e}");
            std::process::exit(1);
        }
    };
    let shutdown = bridge.shutdown_flag();
    let subscription = broker.subscribe(&prefix);
    let bridge_handle = std::thread::spawn(move || bridge.run());

    let registry = SessionRegistry::new(KinematicWorld::new());
    let sweeper = LifecycleSweeper::new(config.sweep_period(), config.session_timeout());
    let sweeper_handle = registry.spawn_sweeper(sweeper, Arc::clone(&shutdown));

    // Message loop and sweeper share the one registry lock.
    let started = Instant::now();
    loop {
        if let Some(secs) = duration_secs {
            if started.elapsed() >= Duration::from_secs(secs) {
                println!("configured duration elapsed");
                break;
            }
        }
        match subscription.recv_timeout(Duration::from_millis(200)) {
            Ok(publication) => match classify(&publication) {
                Ok(update) => registry.apply(update, Instant::now()),
                Err(e) => {
                    tracing::warn!(topic = %publication.topic, error = %e, "unclassifiable publication dropped");
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    if let Err(e) = bridge_handle.join().unwrap_or(Ok(())) {
        eprintln!("bridge failed: {e}");
    }
    sweeper_handle.join().ok();

    println!("sessions at shutdown: {}", registry.len());
    registry.shutdown();
    println!("done: bridge torn down cleanly");
}
