//! Rotation state machine for the spool writer.
//!
//! # Design
//!
//! One [`RotationState`] is owned by each [`SpoolWriter`](crate::SpoolWriter)
//! and only touched while the writer's lock is held. Before every write,
//! [`RotationState::prepare`] decides whether the batch goes into the open
//! segment file, into a new file in the same hour folder, or into a new hour
//! folder:
//!
//! - same hour, file open, and the file is empty or the batch fits the size
//!   limit: keep the file;
//! - same hour otherwise: close the file (index record, serial + 1) and open
//!   the next serial;
//! - different hour: close the file, retire the folder (`_t` marker), open
//!   the new hour folder with serial 0, purge expired folders, open a file.
//!
//! A file is always fully closed, with its index record appended, before the
//! next one is opened. Once the serial passes [`SERIAL_LIMIT`] no further
//! file is opened in that hour and batches are dropped until the hour
//! changes.
//!
//! # File Layout
//!
//! ```text
//! base/
//! ├── 0ecu0/          <- hour folder (base32 of masked hour)
//! │   ├── 0000        <- segment file, serial 0
//! │   ├── 000g        <- segment file, serial 1
//! │   ├── _index      <- "<file>\t<start> - <last write>\n" per closed file
//! │   └── _t          <- retirement marker
//! └── 0ecu2/
//!     └── ...
//! ```

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SpoolConfig;
use crate::error::WriterError;
use crate::naming::{self, INDEX_FILE_NAME, MARKER_FILE_NAME};
use crate::retention;

/// Highest serial number for which a segment file is still opened.
pub const SERIAL_LIMIT: u32 = 0x7FFF_FFFD;

/// Counters describing what a writer has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpoolStats {
    /// Batches written to segment files.
    pub batches_written: u64,
    /// Bytes written to segment files.
    pub bytes_written: u64,
    /// Batches dropped because the hour's serial numbers were exhausted.
    pub batches_dropped: u64,
    /// Segment files opened.
    pub files_opened: u64,
    /// Segment files closed (each with an index record attempt).
    pub files_closed: u64,
    /// Hour folders opened.
    pub folders_opened: u64,
    /// Hour folders retired (marker written).
    pub folders_retired: u64,
    /// Expired hour folders removed.
    pub folders_purged: u64,
    /// Expired hour folders that could not be removed.
    pub purge_failures: u64,
}

/// Result of preparing the state for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Prepared {
    /// A segment file is open and accepts the batch.
    Ready,
    /// No file can be opened in this hour; the batch must be dropped.
    Exhausted {
        /// The serial that would have been used.
        serial: u32,
    },
}

/// The hour folder currently written to.
#[derive(Debug)]
struct HourFolder {
    path: PathBuf,
    index_path: PathBuf,
}

/// The open segment file.
#[derive(Debug)]
struct Segment {
    name: String,
    path: PathBuf,
    file: File,
    started_at: DateTime<Utc>,
    last_write_at: DateTime<Utc>,
    size: usize,
}

/// Mutable rotation state: current hour, serial, folder and open file.
#[derive(Debug, Default)]
pub(crate) struct RotationState {
    hour: Option<u32>,
    serial: u32,
    folder: Option<HourFolder>,
    segment: Option<Segment>,
    stats: SpoolStats,
}

impl RotationState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn stats(&self) -> SpoolStats {
        self.stats
    }

    /// Makes sure a segment file able to take `record_size` bytes is open.
    pub(crate) fn prepare(
        &mut self,
        config: &SpoolConfig,
        now: DateTime<Utc>,
        record_size: usize,
    ) -> Result<Prepared, WriterError> {
        let hour = naming::hour_bucket(now.timestamp());

        if self.hour == Some(hour) {
            if let Some(segment) = &self.segment
                && (segment.size == 0 || segment.size + record_size <= config.file_size_limit)
            {
                return Ok(Prepared::Ready);
            }
            self.close_segment()?;
            self.ensure_folder(hour, config)?;
        } else {
            let mut errors = Vec::new();
            if let Err(e) = self.close_segment() {
                errors.push(e);
            }
            if let Err(e) = self.retire_folder(now) {
                errors.push(e);
            }
            // The old folder is done with even if closing it failed.
            self.folder = None;
            match self.open_folder(hour, config) {
                Ok(()) => self.purge(config, now),
                Err(e) => errors.push(e),
            }
            if let Some(e) =
                WriterError::aggregate(format!("cannot switch to new hour {hour}"), errors)
            {
                return Err(e);
            }
        }

        if self.serial > SERIAL_LIMIT {
            return Ok(Prepared::Exhausted {
                serial: self.serial,
            });
        }

        self.open_segment(now)?;
        Ok(Prepared::Ready)
    }

    /// Appends an encoded batch to the open segment file.
    ///
    /// Returns the file path, or `None` when no file is open.
    pub(crate) fn write(
        &mut self,
        buf: &[u8],
        record_count: usize,
        now: DateTime<Utc>,
    ) -> Result<Option<PathBuf>, WriterError> {
        let Some(segment) = self.segment.as_mut() else {
            return Ok(None);
        };

        if let Err(source) = segment.file.write_all(buf) {
            let write_error = WriterError::Write {
                path: segment.path.clone(),
                record_count,
                source,
            };
            // Cut the file back to the last complete batch.
            let Err(e) = truncate_to(&mut segment.file, segment.size as u64) else {
                return Err(write_error);
            };
            warn!(
                file = %segment.path.display(),
                error = %e,
                "cannot discard partial write, closing output file"
            );
            let mut errors = vec![
                write_error,
                WriterError::Rollback {
                    path: segment.path.clone(),
                    source: e,
                },
            ];
            if let Err(e) = self.close_segment() {
                errors.push(e);
            }
            return Err(WriterError::Aggregate {
                context: "caught failure on writing output file".to_string(),
                errors,
            });
        }

        segment.last_write_at = now;
        segment.size += buf.len();
        self.stats.batches_written += 1;
        self.stats.bytes_written += buf.len() as u64;

        Ok(Some(segment.path.clone()))
    }

    pub(crate) fn record_drop(&mut self) {
        self.stats.batches_dropped += 1;
    }

    /// Closes the open file and retires the folder, collecting all failures.
    pub(crate) fn close_all(&mut self, now: DateTime<Utc>) -> Result<(), WriterError> {
        let mut errors = Vec::new();
        if let Err(e) = self.close_segment() {
            errors.push(e);
        }
        if let Err(e) = self.retire_folder(now) {
            errors.push(e);
        }
        match WriterError::aggregate("caught failure on shutdown spool writer", errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Closes the open segment: sync, append index record, advance serial.
    ///
    /// The file handle is released and the serial advanced even when the
    /// sync or the index append fails.
    fn close_segment(&mut self) -> Result<(), WriterError> {
        let Some(segment) = self.segment.take() else {
            return Ok(());
        };

        let mut errors = Vec::new();
        if let Err(e) = segment.file.sync_data() {
            errors.push(WriterError::Flush {
                path: segment.path.clone(),
                source: e,
            });
        }
        drop(segment.file);

        if let Err(e) = self.append_index_record(
            &segment.name,
            segment.started_at,
            segment.last_write_at,
        ) {
            errors.push(e);
        }

        self.serial = self.serial.saturating_add(1);
        self.stats.files_closed += 1;
        debug!(
            file = %segment.path.display(),
            size = segment.size,
            next_serial = self.serial,
            "closed output file"
        );

        match WriterError::aggregate("caught error on closing output file", errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn append_index_record(
        &self,
        file_name: &str,
        started_at: DateTime<Utc>,
        last_write_at: DateTime<Utc>,
    ) -> Result<(), WriterError> {
        let Some(folder) = &self.folder else {
            return Ok(());
        };

        let line = format!(
            "{file_name}\t{} - {}\n",
            format_timestamp(started_at),
            format_timestamp(last_write_at)
        );

        let mut index = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&folder.index_path)
            .map_err(|e| WriterError::IndexOpen {
                path: folder.index_path.clone(),
                source: e,
            })?;

        index
            .write_all(line.as_bytes())
            .map_err(|e| WriterError::IndexAppend {
                path: folder.index_path.clone(),
                source: e,
            })
    }

    /// Writes the `_t` marker into the current folder, if any.
    fn retire_folder(&mut self, now: DateTime<Utc>) -> Result<(), WriterError> {
        let Some(folder) = &self.folder else {
            return Ok(());
        };

        let path = folder.path.join(MARKER_FILE_NAME);
        std::fs::write(&path, marker_content(now))
            .map_err(|e| WriterError::Marker { path, source: e })?;

        self.stats.folders_retired += 1;
        info!(folder = %folder.path.display(), "retired output folder");
        Ok(())
    }

    /// Creates the folder for `hour`; on success resets the serial to 0.
    fn open_folder(&mut self, hour: u32, config: &SpoolConfig) -> Result<(), WriterError> {
        let path = naming::folder_path(&config.base_folder, hour);
        std::fs::create_dir_all(&path).map_err(|e| WriterError::CreateFolder {
            path: path.clone(),
            source: e,
        })?;

        info!(folder = %path.display(), hour, "opened output folder");
        self.folder = Some(HourFolder {
            index_path: path.join(INDEX_FILE_NAME),
            path,
        });
        self.hour = Some(hour);
        self.serial = 0;
        self.stats.folders_opened += 1;
        Ok(())
    }

    /// Recreates the current hour folder if it disappeared, keeping the serial.
    fn ensure_folder(&mut self, hour: u32, config: &SpoolConfig) -> Result<(), WriterError> {
        if self.folder.is_none() {
            return self.open_folder(hour, config);
        }
        match &self.folder {
            Some(folder) if !folder.path.is_dir() => {
                warn!(folder = %folder.path.display(), "output folder lost, recreating");
                std::fs::create_dir_all(&folder.path).map_err(|e| WriterError::CreateFolder {
                    path: folder.path.clone(),
                    source: e,
                })
            }
            _ => Ok(()),
        }
    }

    fn purge(&mut self, config: &SpoolConfig, now: DateTime<Utc>) {
        let report =
            retention::purge_expired(&config.base_folder, config.retain_hours, now.timestamp());
        self.stats.folders_purged += report.removed.len() as u64;
        self.stats.purge_failures += report.failures.len() as u64;
        if let Some(e) = report.into_error() {
            warn!(error = %e, "purge incomplete");
        }
    }

    /// Creates the segment file for the current serial.
    fn open_segment(&mut self, now: DateTime<Utc>) -> Result<(), WriterError> {
        let Some(folder) = &self.folder else {
            return Ok(());
        };

        let name = naming::file_name(self.serial);
        let path = folder.path.join(&name);

        let mut options = OpenOptions::new();
        options.create(true).truncate(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(&path).map_err(|e| WriterError::CreateFile {
            path: path.clone(),
            source: e,
        })?;

        debug!(file = %path.display(), serial = self.serial, "opened output file");
        self.segment = Some(Segment {
            name,
            path,
            file,
            started_at: now,
            last_write_at: now,
            size: 0,
        });
        self.stats.files_opened += 1;
        Ok(())
    }
}

/// Truncates `file` to `len` bytes and moves the write position to its end.
fn truncate_to(file: &mut File, len: u64) -> std::io::Result<()> {
    file.set_len(len)?;
    file.seek(SeekFrom::Start(len))?;
    Ok(())
}

/// Formats a timestamp as RFC 3339 with whole seconds and a `Z` suffix.
pub(crate) fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Builds the three-line `_t` marker: base64url(u64 LE seconds), decimal
/// seconds, RFC 3339.
pub(crate) fn marker_content(now: DateTime<Utc>) -> String {
    let seconds = now.timestamp();
    let encoded = URL_SAFE_NO_PAD.encode(seconds.to_le_bytes());
    format!("{encoded}\n{seconds}\n{}\n", format_timestamp(now))
}
