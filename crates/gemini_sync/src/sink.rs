//! # Observation Sinks
//!
//! Per-run CSV logs: `(timestamp, id, x, y, z)` pose rows for both worlds,
//! and the `(id, collision_count)` summary written at shutdown.
//!
//! Sinks are observational only. A sink write failure is logged and the
//! pipeline continues; sinks never influence control flow.

use crate::error::SyncResult;
use gemini_shared::{EntityId, Vec3};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Append-only CSV pose log.
pub struct PoseLog {
    writer: BufWriter<File>,
    /// Set after the first write error so the log does not spam one line
    /// per row once the disk is gone.
    failed: bool,
}

impl PoseLog {
    /// Creates the file and writes the header row.
    pub fn create<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(b"timestamp,id,x,y,z\n")?;
        Ok(Self { writer, failed: false })
    }

    /// Appends one pose row. Errors are logged, not propagated.
    pub fn record(&mut self, timestamp: f64, id: EntityId, location: Vec3) {
        if self.failed {
            return;
        }
        let row = format!(
            "{timestamp},{id},{},{},{}\n",
            location.x, location.y, location.z
        );
        if let Err(e) = self.writer.write_all(row.as_bytes()) {
            tracing::warn!(error = %e, "pose log write failed, disabling sink");
            self.failed = true;
        }
    }

    /// Flushes buffered rows. Called once per tick batch.
    pub fn flush(&mut self) {
        if self.failed {
            return;
        }
        if let Err(e) = self.writer.flush() {
            tracing::warn!(error = %e, "pose log flush failed, disabling sink");
            self.failed = true;
        }
    }
}

/// Writes the collision summary CSV: one `(id, collision_count)` row per
/// entity that ever collided.
pub fn write_collision_summary<P: AsRef<Path>>(
    path: P,
    rows: &[(EntityId, u64)],
) -> SyncResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(b"id,collision_count\n")?;
    for (id, count) in rows {
        writer.write_all(format!("{id},{count}\n").as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}
