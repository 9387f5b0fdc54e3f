//! The spool writer: the entry point used by a telemetry pipeline.
//!
//! [`SpoolWriter`] frames each exported batch, then, under a single lock,
//! runs the rotation state machine and appends the batch to the current
//! segment file. Batches from concurrent callers are therefore written one
//! at a time and never interleave.
//!
//! # Example
//!
//! ```rust,no_run
//! use tracespool::{SpoolConfig, SpoolWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let writer = SpoolWriter::new(SpoolConfig::new("/var/spool/traces"))?;
//!
//! // Records are already-serialized span messages.
//! writer.export_records(&[b"...".to_vec()])?;
//!
//! writer.shutdown()?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::config::SpoolConfig;
use crate::error::Result;
use crate::frame;
use crate::proto::ResourceSpans;
use crate::rotation::{Prepared, RotationState};

pub use crate::rotation::{SERIAL_LIMIT, SpoolStats};

/// What happened to one exported batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The batch was empty; nothing was touched on disk.
    Skipped,
    /// The batch was appended to a segment file.
    Written {
        /// The segment file that received the batch.
        path: PathBuf,
        /// Encoded size of the batch in bytes.
        bytes: usize,
    },
    /// The hour's serial numbers are exhausted; the batch was discarded.
    Dropped {
        /// The serial number that could not be used.
        serial: u32,
    },
}

/// Rotating on-disk spool for span batches.
///
/// # Thread Safety
///
/// `SpoolWriter` is `Send + Sync`; share it behind an `Arc`. All rotation
/// state sits behind one mutex, held across the rotation decision and the
/// write. [`shutdown`](Self::shutdown) takes the same lock.
pub struct SpoolWriter {
    config: SpoolConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<RotationState>,
}

impl std::fmt::Debug for SpoolWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpoolWriter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SpoolWriter {
    /// Creates a writer using the system clock.
    ///
    /// Nothing is created on disk until the first non-empty export.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingBaseFolder`](crate::error::ConfigError)
    /// if the configuration has no base folder.
    pub fn new(config: SpoolConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a writer reading time from `clock`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_clock(config: SpoolConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.normalized(),
            clock,
            state: Mutex::new(RotationState::new()),
        })
    }

    /// Returns the effective (clamped) configuration.
    pub fn config(&self) -> &SpoolConfig {
        &self.config
    }

    /// Encodes span records and spools them as one batch.
    ///
    /// # Errors
    ///
    /// Returns a frame error if encoding fails, otherwise the same errors as
    /// [`export_records`](Self::export_records).
    pub fn export_spans(&self, spans: &[ResourceSpans]) -> Result<ExportOutcome> {
        let buf = frame::encode_spans(spans, &self.config.encode_options)?;
        self.write_batch(&buf, spans.len())
    }

    /// Spools already-serialized span records as one batch.
    ///
    /// An empty input returns [`ExportOutcome::Skipped`] without touching
    /// the disk.
    ///
    /// # Errors
    ///
    /// Returns a writer error if a folder or file cannot be created, the
    /// previous file cannot be closed cleanly, or the write fails. The
    /// rotation state stays consistent and the next call retries.
    pub fn export_records<T: AsRef<[u8]>>(&self, records: &[T]) -> Result<ExportOutcome> {
        let buf = frame::encode_batch(records)?;
        self.write_batch(&buf, records.len())
    }

    fn write_batch(&self, buf: &[u8], record_count: usize) -> Result<ExportOutcome> {
        if buf.is_empty() {
            return Ok(ExportOutcome::Skipped);
        }

        let mut state = self.lock_state();
        let now = self.clock.now();

        if let Prepared::Exhausted { serial } = state.prepare(&self.config, now, buf.len())? {
            state.record_drop();
            warn!(
                serial,
                record_count, "serial numbers exhausted for this hour, dropping batch"
            );
            return Ok(ExportOutcome::Dropped { serial });
        }

        let written_at = self.clock.now();
        match state.write(buf, record_count, written_at)? {
            Some(path) => Ok(ExportOutcome::Written {
                path,
                bytes: buf.len(),
            }),
            None => Ok(ExportOutcome::Skipped),
        }
    }

    /// Closes the open segment file and retires the open hour folder.
    ///
    /// Both steps are attempted even if the first fails; all failures are
    /// returned together. Safe to call when nothing was ever written, and
    /// safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns an aggregated writer error listing every failed step.
    pub fn shutdown(&self) -> Result<()> {
        let mut state = self.lock_state();
        state.close_all(self.clock.now())?;
        Ok(())
    }

    /// Returns a snapshot of the writer's counters.
    pub fn stats(&self) -> SpoolStats {
        self.lock_state().stats()
    }

    /// Rotation state is consistent between operations, so a panic in
    /// another caller does not invalidate it.
    fn lock_state(&self) -> MutexGuard<'_, RotationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
