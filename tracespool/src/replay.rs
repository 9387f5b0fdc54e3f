//! Sequential replay of spooled batches.
//!
//! Each batch is handed to the [`Uploader`] before the next one is decoded,
//! so a corrupt or truncated tail never takes back batches that were already
//! delivered from the same file.

use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ReplayError;
use crate::frame::FrameReader;
use crate::naming;
use crate::upload::Uploader;

/// Order in which the files of one folder are replayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplayOrder {
    /// Directory listing order: file names sorted bytewise. Names change
    /// width past serial `0xFFFF`, so this is not serial order across that
    /// boundary.
    #[default]
    Listing,
    /// Ascending decoded serial. Names that are not segment names follow,
    /// sorted by name.
    Serial,
}

/// Counters for a successful replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Files read to a clean end of stream.
    pub files: usize,
    /// Non-empty batches uploaded.
    pub batches: usize,
    /// Records uploaded.
    pub records: usize,
}

impl ReplayStats {
    fn merge(&mut self, other: Self) {
        self.files += other.files;
        self.batches += other.batches;
        self.records += other.records;
    }
}

/// Shape of one segment file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileSummary {
    /// Number of batches, including ones with only padding.
    pub batches: usize,
    /// Number of records across all batches.
    pub records: usize,
    /// Total payload bytes.
    pub bytes: u64,
}

/// Replays every batch of one segment file.
///
/// Batches without records are skipped. Replay stops at the first framing
/// or upload failure; batches before it have already been uploaded.
///
/// # Errors
///
/// Returns [`ReplayError::Open`] if the file cannot be opened,
/// [`ReplayError::Frame`] on a corrupt or truncated batch, and
/// [`ReplayError::Upload`] if the uploader rejects a batch.
pub fn replay_file<U: Uploader + ?Sized>(
    path: &Path,
    uploader: &mut U,
) -> Result<ReplayStats, ReplayError> {
    let file = File::open(path).map_err(|e| ReplayError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = FrameReader::new(BufReader::new(file));
    let mut stats = ReplayStats::default();

    loop {
        let batch = reader.next_batch().map_err(|e| ReplayError::Frame {
            path: path.to_path_buf(),
            source: e,
        })?;
        let Some(spans) = batch else {
            break;
        };
        if spans.is_empty() {
            continue;
        }

        uploader.upload(&spans).map_err(|e| ReplayError::Upload {
            path: path.to_path_buf(),
            record_count: spans.len(),
            source: e,
        })?;
        debug!(path = %path.display(), records = spans.len(), "uploaded batch");
        stats.batches += 1;
        stats.records += spans.len();
    }

    stats.files = 1;
    info!(
        path = %path.display(),
        batches = stats.batches,
        records = stats.records,
        "replayed trace file"
    );
    Ok(stats)
}

/// Replays the files of one folder in directory listing order (sorted by
/// file name).
///
/// Subdirectories are skipped, as are names longer than one character that
/// start with `_` or `.`. Stops at the first file that fails.
///
/// # Errors
///
/// Returns [`ReplayError::ReadDir`] if the folder cannot be listed, or the
/// first error from [`replay_file`].
pub fn replay_folder<U: Uploader + ?Sized>(
    path: &Path,
    uploader: &mut U,
) -> Result<ReplayStats, ReplayError> {
    replay_folder_with(path, uploader, ReplayOrder::Listing)
}

/// Replays the files of one folder in the given order.
///
/// # Errors
///
/// Same as [`replay_folder`].
pub fn replay_folder_with<U: Uploader + ?Sized>(
    path: &Path,
    uploader: &mut U,
    order: ReplayOrder,
) -> Result<ReplayStats, ReplayError> {
    let mut files = segment_files(path)?;
    match order {
        ReplayOrder::Listing => files.sort_unstable_by(|a, b| {
            let a = a.file_name().map(OsStr::as_encoded_bytes);
            let b = b.file_name().map(OsStr::as_encoded_bytes);
            a.cmp(&b)
        }),
        ReplayOrder::Serial => sort_by_serial(&mut files),
    }

    let mut stats = ReplayStats::default();
    for file in &files {
        stats.merge(replay_file(file, uploader)?);
    }
    Ok(stats)
}

/// Replays a whole spool: every hour folder under `base`, ordered by hour
/// bucket, each in serial order.
///
/// Entries under `base` that are not hour folders are ignored.
///
/// # Errors
///
/// Returns [`ReplayError::ReadDir`] if `base` or an hour folder cannot be
/// listed, or the first error from [`replay_file`].
pub fn replay_spool<U: Uploader + ?Sized>(
    base: &Path,
    uploader: &mut U,
) -> Result<ReplayStats, ReplayError> {
    let mut stats = ReplayStats::default();
    for (hour, folder) in hour_folders(base)? {
        debug!(hour, path = %folder.display(), "replaying hour folder");
        stats.merge(replay_folder_with(&folder, uploader, ReplayOrder::Serial)?);
    }
    Ok(stats)
}

/// Lists the hour folders under `base`, sorted by decoded hour bucket.
///
/// # Errors
///
/// Returns [`ReplayError::ReadDir`] if `base` cannot be listed.
pub fn hour_folders(base: &Path) -> Result<Vec<(u32, PathBuf)>, ReplayError> {
    let mut folders = Vec::new();
    for entry in read_dir(base)? {
        let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
        let hour = entry.file_name().to_str().and_then(naming::parse_folder_name);
        if let (true, Some(hour)) = (is_dir, hour) {
            folders.push((hour, entry.path()));
        }
    }
    folders.sort_unstable_by_key(|(hour, _)| *hour);
    Ok(folders)
}

/// Counts batches and records in a segment file without decoding payloads.
///
/// # Errors
///
/// Returns [`ReplayError::Open`] or [`ReplayError::Frame`], as
/// [`replay_file`] does.
pub fn inspect_file(path: &Path) -> Result<FileSummary, ReplayError> {
    let file = File::open(path).map_err(|e| ReplayError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = FrameReader::new(BufReader::new(file));
    let mut summary = FileSummary::default();

    while let Some(payloads) = reader.next_raw_batch().map_err(|e| ReplayError::Frame {
        path: path.to_path_buf(),
        source: e,
    })? {
        summary.batches += 1;
        summary.records += payloads.len();
        summary.bytes += payloads.iter().map(|p| p.len() as u64).sum::<u64>();
    }
    Ok(summary)
}

/// Returns `true` for names the replayer treats as bookkeeping files.
fn is_hidden(name: &[u8]) -> bool {
    name.len() > 1 && matches!(name[0], b'_' | b'.')
}

fn read_dir(path: &Path) -> Result<Vec<std::fs::DirEntry>, ReplayError> {
    let read_dir_error = |e| ReplayError::ReadDir {
        path: path.to_path_buf(),
        source: e,
    };
    std::fs::read_dir(path)
        .map_err(read_dir_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_dir_error)
}

fn segment_files(folder: &Path) -> Result<Vec<PathBuf>, ReplayError> {
    let mut files = Vec::new();
    for entry in read_dir(folder)? {
        if entry.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        if is_hidden(entry.file_name().as_encoded_bytes()) {
            continue;
        }
        files.push(entry.path());
    }
    Ok(files)
}

fn sort_by_serial(files: &mut [PathBuf]) {
    files.sort_by_cached_key(|path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let serial = naming::parse_file_name(&name);
        (serial.is_none(), serial, name)
    });
}
