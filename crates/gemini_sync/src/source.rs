//! # State Source
//!
//! The physical-world producer: samples the entity roster every tick,
//! frames it, and streams it to the relay.
//!
//! The first frame on the connection is always the full init roster; every
//! frame after is a delta for one tick. A broken pipe on send means the
//! relay is gone — the source raises the shared stop flag and ends, it
//! does not reconnect.

use crate::error::SyncResult;
use crate::framing;
use crate::sink::PoseLog;
use crate::world::WorldLink;
use gemini_shared::{Frame, InitFrame, DEFAULT_RELAY_DIAL_ADDR, TICK_INTERVAL};
use std::io::BufWriter;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Producer configuration.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Relay address to dial.
    pub relay_addr: String,
    /// Sampling cadence; one delta frame per interval.
    pub tick_interval: Duration,
    /// Stop after this long; `None` runs until the relay hangs up.
    pub run_for: Option<Duration>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            relay_addr: DEFAULT_RELAY_DIAL_ADDR.to_string(),
            tick_interval: TICK_INTERVAL,
            run_for: None,
        }
    }
}

/// Samples a world and streams it out.
pub struct StateSource<W: WorldLink> {
    world: W,
    config: SourceConfig,
    pose_log: Option<PoseLog>,
    shutdown: Arc<AtomicBool>,
}

impl<W: WorldLink> StateSource<W> {
    /// Creates a source over the given world.
    #[must_use]
    pub fn new(world: W, config: SourceConfig) -> Self {
        Self { world, config, pose_log: None, shutdown: Arc::new(AtomicBool::new(false)) }
    }

    /// Attaches a pose log sink.
    #[must_use]
    pub fn with_pose_log(mut self, log: PoseLog) -> Self {
        self.pose_log = Some(log);
        self
    }

    /// The cooperative stop flag.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Streams the world until stopped.
    ///
    /// Returns the number of frames sent, the init frame included.
    pub fn run(&mut self) -> SyncResult<u64> {
        let stream = TcpStream::connect(&self.config.relay_addr)?;
        tracing::info!(addr = %self.config.relay_addr, "connected to relay");
        let mut writer = BufWriter::new(stream);

        let roster = self.world.snapshots();
        framing::send_frame(&mut writer, &Frame::Init(InitFrame::new(roster.clone())))?;
        tracing::info!(entities = roster.len(), "init frame sent");

        let started = Instant::now();
        let mut frames = 1u64;
        while !self.shutdown.load(Ordering::Relaxed) {
            if let Some(limit) = self.config.run_for {
                if started.elapsed() >= limit {
                    tracing::info!(frames, "configured duration elapsed");
                    break;
                }
            }

            self.world.tick();
            let snapshots = self.world.snapshots();
            if let Some(log) = self.pose_log.as_mut() {
                for snapshot in snapshots.iter().filter(|s| s.is_vehicle()) {
                    log.record(snapshot.source_timestamp, snapshot.id, snapshot.location);
                }
                log.flush();
            }

            match framing::send_frame(&mut writer, &Frame::Delta(snapshots)) {
                Ok(()) => frames += 1,
                Err(e) => {
                    // Relay hung up: normal end of a run, not an error.
                    tracing::info!(error = %e, "relay closed the connection, stopping producer");
                    self.shutdown.store(true, Ordering::Relaxed);
                    break;
                }
            }
            std::thread::sleep(self.config.tick_interval);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematic::KinematicWorld;
    use std::io::BufReader;
    use std::net::TcpListener;

    #[test]
    fn test_init_first_then_deltas() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let sink = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut frames = Vec::new();
            while let Some(frame) = framing::recv_frame(&mut reader).unwrap() {
                frames.push(frame);
            }
            frames
        });

        let mut world = KinematicWorld::with_capacity(16);
        world.populate(2, 1);
        let config = SourceConfig {
            relay_addr: addr.to_string(),
            tick_interval: Duration::from_millis(5),
            run_for: Some(Duration::from_millis(60)),
        };
        let sent = StateSource::new(world, config).run().unwrap();
        assert!(sent >= 2);

        let frames = sink.join().unwrap();
        assert_eq!(frames.len() as u64, sent);
        assert!(frames[0].is_init());
        for frame in &frames[1..] {
            match frame {
                Frame::Delta(snapshots) => assert_eq!(snapshots.len(), 3),
                other => panic!("expected delta, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unreachable_relay_is_an_error() {
        // Port 1 on loopback: nothing listens there.
        let config = SourceConfig {
            relay_addr: "127.0.0.1:1".to_string(),
            tick_interval: Duration::from_millis(5),
            run_for: Some(Duration::from_millis(10)),
        };
        let mut source = StateSource::new(KinematicWorld::new(), config);
        assert!(source.run().is_err());
    }
}
