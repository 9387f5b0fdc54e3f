//! Retention purge of expired hour folders.
//!
//! Purging runs once per folder change and removes at most
//! [`PURGE_RANGE_COUNT`] folders: the two most recent hours that fell out of
//! the retention window. It never scans the base folder, so the cost per
//! rotation stays constant; folders older than that window are only
//! reclaimed if a rotation happened while they were in range.
//!
//! Failures never abort the rotation that triggered the purge. They are
//! collected into the returned [`PurgeReport`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::WriterError;
use crate::naming::{self, HOUR_MASK};

/// Number of expired hours examined per purge.
pub const PURGE_RANGE_COUNT: i64 = 2;

/// Outcome of one purge pass.
#[derive(Debug, Default)]
pub struct PurgeReport {
    /// Folders that existed and were removed.
    pub removed: Vec<PathBuf>,
    /// Folders that could not be removed.
    pub failures: Vec<WriterError>,
}

impl PurgeReport {
    /// Returns `true` if every candidate was removed or already absent.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Folds the failures into one error, if any.
    pub fn into_error(self) -> Option<WriterError> {
        WriterError::aggregate("cannot purge recent expired output folders", self.failures)
    }
}

/// Returns the unmasked hours that are purge candidates at `unix_seconds`.
///
/// Candidates are `current - retain - 1` and the hour before it; negative
/// hours are skipped. Empty when `retain_hours` is zero.
pub fn expired_hours(unix_seconds: i64, retain_hours: u32) -> Vec<i64> {
    if retain_hours < 1 {
        return Vec::new();
    }
    let current_hour = unix_seconds.div_euclid(3600);
    let expired_base = current_hour - i64::from(retain_hours) - 1;
    (0..PURGE_RANGE_COUNT)
        .map(|offset| expired_base - offset)
        .take_while(|&hour| hour >= 0)
        .collect()
}

/// Removes the most recent expired hour folders under `base`.
///
/// Missing folders are not an error.
pub fn purge_expired(base: &Path, retain_hours: u32, unix_seconds: i64) -> PurgeReport {
    let mut report = PurgeReport::default();

    for hour in expired_hours(unix_seconds, retain_hours) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // non-negative, masked
        let masked = (hour & i64::from(HOUR_MASK)) as u32;
        let path = naming::folder_path(base, masked);

        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "purged expired output folder");
                report.removed.push(path);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot remove expired output folder");
                report
                    .failures
                    .push(WriterError::RemoveFolder { path, source: e });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3600;

    #[test]
    fn test_expired_hours_window() {
        let now = 1000 * HOUR + 5;
        assert_eq!(expired_hours(now, 8), vec![991, 990]);
        assert_eq!(expired_hours(now, 1), vec![998, 997]);
    }

    #[test]
    fn test_expired_hours_disabled() {
        assert!(expired_hours(1000 * HOUR, 0).is_empty());
    }

    #[test]
    fn test_expired_hours_near_epoch() {
        // current hour 9, retain 8 -> base 0, next would be -1.
        assert_eq!(expired_hours(9 * HOUR, 8), vec![0]);
        assert!(expired_hours(5 * HOUR, 8).is_empty());
    }

    #[test]
    fn test_purge_removes_only_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        let now = 1000 * HOUR;

        for hour in [989u32, 990, 991, 992, 1000] {
            let folder = naming::folder_path(base, hour);
            std::fs::create_dir_all(&folder).unwrap();
            std::fs::write(folder.join("0000"), b"data").unwrap();
        }

        let report = purge_expired(base, 8, now);
        assert!(report.is_clean());
        assert_eq!(report.removed.len(), 2);

        assert!(naming::folder_path(base, 989).exists());
        assert!(!naming::folder_path(base, 990).exists());
        assert!(!naming::folder_path(base, 991).exists());
        assert!(naming::folder_path(base, 992).exists());
        assert!(naming::folder_path(base, 1000).exists());
    }

    #[test]
    fn test_purge_missing_folders_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let report = purge_expired(dir.path(), 8, 1000 * HOUR);
        assert!(report.is_clean());
        assert!(report.removed.is_empty());
        assert!(report.into_error().is_none());
    }

    #[test]
    fn test_purge_masks_hour() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        let hour = i64::from(HOUR_MASK) + 10; // wraps to 9
        let now = (hour + 3) * HOUR;

        let folder = naming::folder_path(base, 9);
        std::fs::create_dir_all(&folder).unwrap();

        let report = purge_expired(base, 2, now);
        assert_eq!(report.removed, vec![folder]);
    }
}
