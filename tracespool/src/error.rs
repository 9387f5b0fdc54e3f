//! Error types for the tracespool spool writer and replayer.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all tracespool operations.
///
/// Each variant wraps the error enum of one concern: configuration, the
/// writer's rotation and disk I/O, the binary framing codec, replay, and
/// uploading.
#[derive(Error, Debug)]
pub enum SpoolError {
    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error on the write path (folder/file creation, writes, index, marker).
    #[error("writer error: {0}")]
    Writer(#[from] WriterError),

    /// Error encoding or decoding the binary batch framing.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Error while replaying spooled files.
    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),

    /// Error reported by an uploader.
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
}

/// Errors raised while building or loading a [`SpoolConfig`](crate::SpoolConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The required base folder path was empty.
    #[error("base folder path is required")]
    MissingBaseFolder,

    /// The configuration file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    Load {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for a spool config.
    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur on the spool write path.
#[derive(Error, Debug)]
pub enum WriterError {
    /// An hour folder could not be created.
    #[error("cannot create output folder '{}': {source}", path.display())]
    CreateFolder {
        /// The folder path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A segment file could not be created.
    #[error("cannot create output file '{}': {source}", path.display())]
    CreateFile {
        /// The segment file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing an encoded batch to the segment file failed.
    #[error("cannot write {record_count} records to output file '{}': {source}", path.display())]
    Write {
        /// The segment file path.
        path: PathBuf,
        /// Number of records in the batch that failed.
        record_count: usize,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A failed write could not be cut back to the last complete batch.
    #[error("cannot discard partial write in output file '{}': {source}", path.display())]
    Rollback {
        /// The segment file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Flushing a segment file on close failed.
    #[error("cannot flush output file '{}': {source}", path.display())]
    Flush {
        /// The segment file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The `_index` file could not be opened for append.
    #[error("cannot open index file '{}': {source}", path.display())]
    IndexOpen {
        /// The index file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Appending a record to the `_index` file failed.
    #[error("cannot append content to index file '{}': {source}", path.display())]
    IndexAppend {
        /// The index file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The `_t` retirement marker could not be written.
    #[error("cannot write timestamp file '{}': {source}", path.display())]
    Marker {
        /// The marker file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An expired hour folder could not be removed.
    #[error("cannot remove expired output folder '{}': {source}", path.display())]
    RemoveFolder {
        /// The folder path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Several best-effort steps failed; all failures are kept.
    #[error("{context}: {}", join_errors(errors))]
    Aggregate {
        /// What was being attempted.
        context: String,
        /// The individual failures, in the order they happened.
        errors: Vec<WriterError>,
    },
}

impl WriterError {
    /// Folds a list of failures into a single error, or `None` when empty.
    pub(crate) fn aggregate(context: impl Into<String>, errors: Vec<Self>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self::Aggregate {
                context: context.into(),
                errors,
            })
        }
    }
}

fn join_errors(errors: &[WriterError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from the binary batch framing codec.
#[derive(Error, Debug)]
pub enum FrameError {
    /// A length field decoded to a negative (≥ 2^31) value.
    #[error("corrupt frame: {reason}")]
    Corrupt {
        /// Description of what was invalid.
        reason: String,
    },

    /// End of input was reached inside a count, length, or payload field.
    #[error("truncated frame: unexpected end of input while reading {field}")]
    Truncated {
        /// Which field was being read.
        field: &'static str,
    },

    /// A payload could not be decoded as a span record message.
    #[error("cannot decode span record {index}: {source}")]
    Deserialize {
        /// Position of the record within its batch.
        index: usize,
        /// The protobuf decode error.
        #[source]
        source: prost::DecodeError,
    },

    /// A span record message could not be encoded.
    #[error("cannot encode span record {index}: {source}")]
    Serialize {
        /// Position of the record within its batch.
        index: usize,
        /// The protobuf encode error.
        #[source]
        source: prost::EncodeError,
    },

    /// A record or batch is too large for a 32-bit length prefix.
    #[error("record {index} is {size} bytes, exceeding the frame length limit")]
    RecordTooLarge {
        /// Position of the record within its batch.
        index: usize,
        /// The record size in bytes.
        size: usize,
    },

    /// The underlying reader failed.
    #[error("I/O error while reading frame: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while replaying spooled files.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// A spool file could not be opened.
    #[error("cannot open trace file '{}': {source}", path.display())]
    Open {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A spool folder could not be listed.
    #[error("cannot read trace folder '{}': {source}", path.display())]
    ReadDir {
        /// The folder path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A batch in the file could not be decoded.
    #[error("invalid batch in trace file '{}': {source}", path.display())]
    Frame {
        /// The file path.
        path: PathBuf,
        /// The framing failure.
        #[source]
        source: FrameError,
    },

    /// The uploader rejected a batch.
    #[error("cannot upload {record_count} spans from trace file '{}': {source}", path.display())]
    Upload {
        /// The file path.
        path: PathBuf,
        /// Number of records in the rejected batch.
        record_count: usize,
        /// The uploader's failure.
        #[source]
        source: UploadError,
    },
}

/// Errors returned by an [`Uploader`](crate::upload::Uploader).
#[derive(Error, Debug)]
pub enum UploadError {
    /// The uploader refused the batch for an implementation-specific reason.
    #[error("upload rejected: {0}")]
    Rejected(String),

    /// Failed to serialize the export request to protobuf.
    #[error("failed to serialize export request: {source}")]
    Serialization {
        /// The protobuf encoding error.
        #[source]
        source: prost::EncodeError,
    },

    /// Failed to create the HTTP client.
    #[cfg(feature = "otlp-http")]
    #[error("failed to create HTTP client: {source}")]
    ClientCreate {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP request failed after retries.
    #[cfg(feature = "otlp-http")]
    #[error("HTTP request failed: {source}")]
    RequestFailed {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Collector returned a non-2xx status after retries.
    #[cfg(feature = "otlp-http")]
    #[error("collector returned status {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// The response body text.
        body: String,
    },
}

/// Type alias for `Result<T, SpoolError>`.
pub type Result<T> = std::result::Result<T, SpoolError>;
