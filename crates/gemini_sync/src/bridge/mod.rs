//! # Publish/Subscribe Bridge
//!
//! The alternate ingress path: many producers stream raw JSON records over
//! TCP, the bridge fans them out by vehicle id to topic-scoped channels.
//!
//! ```text
//! producer ──┐
//! producer ──┼──▶ bridge ──▶ broker ──▶ prefix/<car_id> subscriber
//! producer ──┘   (1 thread            (session registry + sweeper)
//!                 per client)
//! ```
//!
//! Unlike the primary path there is no inner framing here: each receive
//! buffer is parsed as one JSON record. Malformed records are dropped with
//! a log line and the connection continues; a failing connection ends only
//! its own handler.
//!
//! For resilience testing the bridge can inject failure: records lacking a
//! recognized archetype field are dropped with a configured probability,
//! and a configured positive delay is applied before every publish (a
//! throughput throttle for tests, not a scheduling guarantee).

pub mod broker;
pub mod session;

pub use broker::{Broker, Publication};
pub use session::{classify, SessionAction, SessionRegistry, SessionUpdate};

use crate::error::SyncResult;
use gemini_shared::{DEFAULT_BRIDGE_ADDR, DEFAULT_TOPIC_PREFIX};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Receive buffer size; one record per receive.
const RECV_BUFFER_LEN: usize = 4096;

/// Bridge configuration.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Address producers dial.
    pub listen_addr: String,
    /// Topic prefix publications go under: `prefix/<car_id>`.
    pub topic_prefix: String,
    /// Probability of dropping a record that lacks an archetype field.
    pub drop_probability: f64,
    /// Artificial delay before every publish; zero disables it.
    pub injected_delay: Duration,
    /// Seed for the drop decision stream.
    pub rng_seed: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_BRIDGE_ADDR.to_string(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            drop_probability: 0.0,
            injected_delay: Duration::ZERO,
            rng_seed: 0x42524447,
        }
    }
}

/// TCP-to-publish/subscribe adapter.
pub struct PubSubBridge {
    config: BridgeConfig,
    broker: Broker,
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
}

impl PubSubBridge {
    /// Binds the listen socket. Serving starts with [`run`](Self::run).
    pub fn bind(config: BridgeConfig, broker: Broker) -> SyncResult<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "bridge listening");
        Ok(Self { config, broker, listener, local_addr, shutdown: Arc::new(AtomicBool::new(false)) })
    }

    /// The bound address, useful when the config asked for port 0.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The cooperative stop flag.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Accepts producers until the stop flag is raised, one handler thread
    /// per connection. Handlers are tracked and joined on the way out so
    /// teardown is deterministic.
    pub fn run(self) -> SyncResult<()> {
        let mut handlers = Vec::new();
        let mut connection_seq = 0u64;

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    tracing::info!(%peer, "producer connected to bridge");
                    let config = self.config.clone();
                    let broker = self.broker.clone();
                    let shutdown = Arc::clone(&self.shutdown);
                    let rng = StdRng::seed_from_u64(self.config.rng_seed ^ connection_seq);
                    connection_seq += 1;
                    handlers.push(std::thread::spawn(move || {
                        handle_producer(stream, peer, &config, &broker, &shutdown, rng);
                    }));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    tracing::error!(error = %e, "bridge accept failed");
                    break;
                }
            }
        }

        self.shutdown.store(true, Ordering::Relaxed);
        for handler in handlers {
            if handler.join().is_err() {
                tracing::warn!("bridge handler panicked");
            }
        }
        tracing::info!("bridge stopped");
        Ok(())
    }
}

/// One producer connection: read a buffer, treat it as one JSON record,
/// publish it. Failures here end this handler only.
fn handle_producer(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: &BridgeConfig,
    broker: &Broker,
    shutdown: &AtomicBool,
    mut rng: StdRng,
) {
    if let Err(e) = stream.set_read_timeout(Some(Duration::from_millis(200))) {
        tracing::warn!(%peer, error = %e, "read timeout rejected, closing handler");
        return;
    }
    let mut buf = [0u8; RECV_BUFFER_LEN];

    loop {
        match stream.read(&mut buf) {
            Ok(0) => {
                tracing::info!(%peer, "producer disconnected from bridge");
                break;
            }
            Ok(n) => process_record(&buf[..n], peer, config, broker, &mut rng),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!(%peer, error = %e, "producer connection failed");
                break;
            }
        }
    }
}

/// Classifies, optionally drops/delays, and publishes one record.
fn process_record(
    raw: &[u8],
    peer: SocketAddr,
    config: &BridgeConfig,
    broker: &Broker,
    rng: &mut StdRng,
) {
    let record: serde_json::Value = match serde_json::from_slice(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(%peer, error = %e, "malformed record dropped");
            return;
        }
    };

    // Injected loss applies only to records without a recognized
    // archetype field; create records always get through.
    if record.get("model").is_none() && rng.gen::<f64>() < config.drop_probability {
        tracing::info!(%peer, "record dropped by injected loss");
        return;
    }

    if config.injected_delay > Duration::ZERO {
        tracing::debug!(%peer, delay = ?config.injected_delay, "injected delay before publish");
        std::thread::sleep(config.injected_delay);
    }

    let car_id = derive_car_id(&record);
    let topic = format!("{}/{}", config.topic_prefix, car_id);
    let delivered = broker.publish(&topic, raw);
    tracing::debug!(%peer, %topic, delivered, "record published");
}

/// The topic segment for a record: its vehicle id, `"unknown"` when the
/// record does not carry one.
fn derive_car_id(record: &serde_json::Value) -> String {
    let field = record.get("car_id").or_else(|| record.get("carId"));
    match field {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => "unknown".to_string(),
    }
}
