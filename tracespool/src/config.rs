//! Spool writer configuration.
//!
//! A [`SpoolConfig`] is immutable once handed to a
//! [`SpoolWriter`](crate::SpoolWriter). Out-of-range values are clamped
//! rather than rejected: the retention window to `[0, 8760]` hours and the
//! file size limit to at least 1024 bytes. Only a missing base folder is an
//! error.
//!
//! Configurations can be built in code or loaded from JSON:
//!
//! ```json
//! { "base_folder": "/var/spool/traces", "retain_hours": 24, "file_size_limit": 8388608 }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::frame::EncodeOptions;

/// Upper bound of the retention window (one year).
pub const MAX_RETAIN_HOURS: u32 = 24 * 365;

/// Default retention window in hours.
pub const DEFAULT_RETAIN_HOURS: u32 = 8;

/// Default per-file size limit (16 MiB).
pub const DEFAULT_FILE_SIZE_LIMIT: usize = 16 * 1024 * 1024;

/// Smallest accepted per-file size limit.
pub const MIN_FILE_SIZE_LIMIT: usize = 1024;

/// Configuration for a [`SpoolWriter`](crate::SpoolWriter).
///
/// # Example
///
/// ```rust
/// use tracespool::SpoolConfig;
///
/// let config = SpoolConfig::new("/var/spool/traces")
///     .with_retain_hours(24)
///     .with_file_size_limit(100);
///
/// assert_eq!(config.retain_hours, 24);
/// assert_eq!(config.file_size_limit, 1024); // clamped to the floor
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoolConfig {
    /// Root folder holding the hour folders.
    pub base_folder: PathBuf,

    /// Hours of spooled data to keep. Zero disables purging.
    #[serde(default = "default_retain_hours")]
    pub retain_hours: u32,

    /// Size in bytes after which a new segment file is started.
    #[serde(default = "default_file_size_limit")]
    pub file_size_limit: usize,

    /// Options passed through to the span record encoder.
    #[serde(default)]
    pub encode_options: EncodeOptions,
}

fn default_retain_hours() -> u32 {
    DEFAULT_RETAIN_HOURS
}

fn default_file_size_limit() -> usize {
    DEFAULT_FILE_SIZE_LIMIT
}

impl SpoolConfig {
    /// Creates a configuration with default retention and size limit.
    pub fn new(base_folder: impl Into<PathBuf>) -> Self {
        Self {
            base_folder: base_folder.into(),
            retain_hours: DEFAULT_RETAIN_HOURS,
            file_size_limit: DEFAULT_FILE_SIZE_LIMIT,
            encode_options: EncodeOptions::default(),
        }
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not a valid configuration.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(config.normalized())
    }

    /// Sets the retention window, clamped to `[0, MAX_RETAIN_HOURS]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // clamped first
    pub fn with_retain_hours(mut self, retain_hours: i64) -> Self {
        self.retain_hours = retain_hours.clamp(0, i64::from(MAX_RETAIN_HOURS)) as u32;
        self
    }

    /// Sets the per-file size limit, raised to at least `MIN_FILE_SIZE_LIMIT`.
    #[must_use]
    pub fn with_file_size_limit(mut self, file_size_limit: usize) -> Self {
        self.file_size_limit = file_size_limit.max(MIN_FILE_SIZE_LIMIT);
        self
    }

    /// Sets the span record encoder options.
    #[must_use]
    pub fn with_encode_options(mut self, encode_options: EncodeOptions) -> Self {
        self.encode_options = encode_options;
        self
    }

    /// Returns a copy with every field clamped into its valid range.
    #[must_use]
    pub fn normalized(self) -> Self {
        let retain_hours = self.retain_hours;
        let file_size_limit = self.file_size_limit;
        self.with_retain_hours(i64::from(retain_hours))
            .with_file_size_limit(file_size_limit)
    }

    /// Checks the required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingBaseFolder`] if the base folder is empty.
    pub fn validate(&self) -> Result<()> {
        if self.base_folder.as_os_str().is_empty() {
            return Err(ConfigError::MissingBaseFolder.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpoolError;

    #[test]
    fn test_defaults() {
        let config = SpoolConfig::new("/tmp/spool");
        assert_eq!(config.retain_hours, 8);
        assert_eq!(config.file_size_limit, 16 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_clamping() {
        let config = SpoolConfig::new("/tmp/spool")
            .with_retain_hours(100_000)
            .with_file_size_limit(10);
        assert_eq!(config.retain_hours, MAX_RETAIN_HOURS);
        assert_eq!(config.file_size_limit, MIN_FILE_SIZE_LIMIT);

        let config = SpoolConfig::new("/tmp/spool").with_retain_hours(-5);
        assert_eq!(config.retain_hours, 0);
    }

    #[test]
    fn test_missing_base_folder() {
        let config = SpoolConfig::new("");
        assert!(matches!(
            config.validate(),
            Err(SpoolError::Config(ConfigError::MissingBaseFolder))
        ));
    }

    #[test]
    fn test_from_json_file_applies_defaults_and_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.json");
        std::fs::write(
            &path,
            r#"{ "base_folder": "/data/spool", "file_size_limit": 1 }"#,
        )
        .unwrap();

        let config = SpoolConfig::from_json_file(&path).unwrap();
        assert_eq!(config.base_folder, PathBuf::from("/data/spool"));
        assert_eq!(config.retain_hours, DEFAULT_RETAIN_HOURS);
        assert_eq!(config.file_size_limit, MIN_FILE_SIZE_LIMIT);
        assert_eq!(config.encode_options, EncodeOptions::default());
    }

    #[test]
    fn test_from_json_file_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            SpoolConfig::from_json_file(&path),
            Err(SpoolError::Config(ConfigError::Parse { .. }))
        ));
    }
}
