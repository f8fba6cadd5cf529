//! # Relay
//!
//! The hub between the physical-world producer and the twin-world
//! consumer: exactly one connection on each side, frames forwarded
//! verbatim in arrival order.
//!
//! ## Discipline
//!
//! - Single-writer: only the forward loop writes to the consumer socket,
//!   so frame boundaries are never interleaved.
//! - Init gating: deltas are forwarded only after an init frame has been.
//!   TCP ordering already guarantees init arrives first; the gate is an
//!   explicit state variable so the transition stays visible.
//! - Producer read failure terminates the relay immediately with no
//!   further forwarding. Consumer write failure, the runtime bound, or an
//!   external stop each trigger at most one `Control(Shutdown)` send
//!   before both sockets close.

use crate::error::{SyncError, SyncResult};
use crate::framing;
use gemini_shared::{Frame, DEFAULT_PRODUCER_ADDR, DEFAULT_TWIN_ADDR, MAX_RUNTIME_SECS};
use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Relay configuration.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Address the producer dials.
    pub listen_addr: String,
    /// Consumer address the relay dials.
    pub forward_addr: String,
    /// Liveness bound: the relay tears down after this long.
    pub max_runtime: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_PRODUCER_ADDR.to_string(),
            forward_addr: DEFAULT_TWIN_ADDR.to_string(),
            max_runtime: Duration::from_secs(MAX_RUNTIME_SECS),
        }
    }
}

/// Counters reported when the relay terminates.
#[derive(Clone, Copy, Debug, Default)]
pub struct RelayStats {
    /// Frames forwarded to the consumer.
    pub frames_forwarded: u64,
    /// Delta frames held back because no init frame had passed yet.
    pub deltas_gated: u64,
    /// Whether the final shutdown frame reached the consumer.
    pub shutdown_sent: bool,
}

/// Explicit init-before-delta gate.
///
/// One per producer connection; flips once and stays flipped.
#[derive(Debug, Default)]
struct InitGate {
    initialized: bool,
}

impl InitGate {
    /// Decides whether a frame may be forwarded, updating the gate.
    fn admit(&mut self, frame: &Frame) -> bool {
        match frame {
            Frame::Init(_) => {
                if self.initialized {
                    tracing::warn!("duplicate init frame on one connection");
                }
                self.initialized = true;
                true
            }
            Frame::Delta(_) => self.initialized,
            Frame::Control(_) => true,
        }
    }
}

/// The scheduler between the two worlds.
pub struct Relay {
    config: RelayConfig,
    listener: TcpListener,
    local_addr: std::net::SocketAddr,
    shutdown: Arc<AtomicBool>,
}

impl Relay {
    /// Binds the producer listen socket. Serving starts with
    /// [`run`](Self::run).
    pub fn bind(config: RelayConfig) -> SyncResult<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        let local_addr = listener.local_addr()?;
        Ok(Self { config, listener, local_addr, shutdown: Arc::new(AtomicBool::new(false)) })
    }

    /// The bound producer address, useful when the config asked for
    /// port 0.
    #[must_use]
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// The cooperative stop flag. Raising it tears the relay down.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Runs the relay to completion.
    ///
    /// Accepts one producer, dials the consumer (unreachable consumer is
    /// fatal before any frame moves), then forwards until the producer
    /// ends, the consumer fails, the runtime bound is hit, or the stop
    /// flag is raised.
    pub fn run(&self) -> SyncResult<RelayStats> {
        tracing::info!(addr = %self.local_addr, "waiting for producer");
        let (producer, peer) = self.listener.accept()?;
        tracing::info!(%peer, "producer connected");

        let consumer =
            TcpStream::connect(&self.config.forward_addr).map_err(|e| SyncError::Unreachable {
                addr: self.config.forward_addr.clone(),
                source: e,
            })?;
        tracing::info!(addr = %self.config.forward_addr, "consumer connected");

        // Clone kept so the liveness loop can wake a blocked read at
        // teardown without ever writing to the consumer side itself.
        let producer_waker = producer.try_clone()?;
        let shutdown = Arc::clone(&self.shutdown);
        let forward = std::thread::spawn(move || forward_loop(producer, consumer, &shutdown));

        let started = Instant::now();
        while !self.shutdown.load(Ordering::Relaxed) && !forward.is_finished() {
            if started.elapsed() >= self.config.max_runtime {
                tracing::info!("maximum runtime reached");
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = producer_waker.shutdown(Shutdown::Both);

        let stats = forward.join().map_err(|_| {
            SyncError::Io(std::io::Error::new(std::io::ErrorKind::Other, "forward loop panicked"))
        })?;
        tracing::info!(
            forwarded = stats.frames_forwarded,
            gated = stats.deltas_gated,
            "relay terminated"
        );
        Ok(stats)
    }
}

/// The single forward loop: reads frames from the producer, writes them
/// to the consumer. Sole writer to the consumer socket.
fn forward_loop(producer: TcpStream, consumer: TcpStream, shutdown: &AtomicBool) -> RelayStats {
    let mut reader = BufReader::new(producer);
    let mut writer = BufWriter::new(consumer);
    let mut gate = InitGate::default();
    let mut stats = RelayStats::default();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            stats.shutdown_sent = send_final_shutdown(&mut writer);
            break;
        }
        match framing::read_frame(&mut reader) {
            Ok(Some(payload)) => {
                let frame: Frame = match serde_json::from_slice(&payload) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(error = %e, "malformed frame dropped");
                        continue;
                    }
                };
                if !gate.admit(&frame) {
                    stats.deltas_gated += 1;
                    continue;
                }
                // Forward the original bytes, not a re-encoding.
                if let Err(e) = framing::write_frame(&mut writer, &payload) {
                    tracing::error!(error = %e, "consumer write failed");
                    stats.shutdown_sent = send_final_shutdown(&mut writer);
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                stats.frames_forwarded += 1;
            }
            Ok(None) => {
                if shutdown.load(Ordering::Relaxed) {
                    // Not a real EOF: the liveness loop closed our read
                    // side to wake us for teardown.
                    stats.shutdown_sent = send_final_shutdown(&mut writer);
                } else {
                    // Producer gone: terminate immediately, no further
                    // forwarding.
                    tracing::info!("producer stream ended");
                    shutdown.store(true, Ordering::Relaxed);
                }
                break;
            }
            Err(e) => {
                if shutdown.load(Ordering::Relaxed) {
                    // Woken for teardown (runtime bound or external stop).
                    stats.shutdown_sent = send_final_shutdown(&mut writer);
                } else {
                    tracing::error!(error = %e, "producer read failed");
                    shutdown.store(true, Ordering::Relaxed);
                }
                break;
            }
        }
    }
    stats
}

/// One shutdown-frame attempt, best effort.
fn send_final_shutdown<W: Write>(writer: &mut W) -> bool {
    match framing::send_frame(writer, &Frame::shutdown()) {
        Ok(()) => {
            tracing::info!("shutdown frame sent to consumer");
            true
        }
        Err(e) => {
            tracing::debug!(error = %e, "consumer unreachable for shutdown frame");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemini_shared::InitFrame;

    #[test]
    fn test_gate_holds_deltas_until_init() {
        let mut gate = InitGate::default();

        assert!(!gate.admit(&Frame::Delta(Vec::new())));
        assert!(gate.admit(&Frame::Init(InitFrame::new(Vec::new()))));
        assert!(gate.admit(&Frame::Delta(Vec::new())));
    }

    #[test]
    fn test_gate_passes_control_frames_always() {
        let mut gate = InitGate::default();
        assert!(gate.admit(&Frame::shutdown()));
        // Control frames do not flip the gate.
        assert!(!gate.admit(&Frame::Delta(Vec::new())));
    }

    #[test]
    fn test_default_config_uses_shared_constants() {
        let config = RelayConfig::default();
        assert_eq!(config.listen_addr, DEFAULT_PRODUCER_ADDR);
        assert_eq!(config.forward_addr, DEFAULT_TWIN_ADDR);
        assert_eq!(config.max_runtime, Duration::from_secs(MAX_RUNTIME_SECS));
    }
}
