//! # tracespool
//!
//! Durable, rotating on-disk spool for telemetry span batches.
//!
//! tracespool lets a telemetry-producing process buffer spans on local disk
//! (to ride out collector outages, backpressure, or offline operation) and
//! forward them later, with batch boundaries and span content preserved
//! exactly.
//!
//! ## Key Properties
//!
//! - One hour folder per wall-clock hour, segment files rotated by size
//! - Length-prefixed binary framing with padding and truncation detection
//! - Bounded retention: expired hour folders are purged on rotation
//! - Batches from concurrent exporters never interleave
//! - Replay uploads each batch before decoding the next
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tracespool::proto::{ResourceSpans, ScopeSpans, Span};
//! use tracespool::{SpoolConfig, SpoolWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SpoolConfig::new("/var/spool/traces").with_retain_hours(24);
//! let writer = SpoolWriter::new(config)?;
//!
//! let batch = vec![ResourceSpans {
//!     scope_spans: vec![ScopeSpans {
//!         spans: vec![Span {
//!             name: "GET /health".to_string(),
//!             ..Default::default()
//!         }],
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! }];
//! writer.export_spans(&batch)?;
//!
//! writer.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`SpoolWriter`]: Exporter entry point; owns the rotation state
//! - [`SpoolConfig`]: Base folder, retention window, file size limit
//! - [`FrameReader`]: Streaming batch decoder
//! - [`replay_folder`] / [`replay_spool`]: Feed spooled batches to an [`Uploader`]
//!
//! ## Modules
//!
//! - [`writer`]: Export path and shutdown
//! - [`frame`]: Batch encoding and decoding
//! - [`naming`]: Base-32 hour folder and segment file names
//! - [`retention`]: Purge of expired hour folders
//! - [`replay`]: File, folder, and spool replay
//! - [`upload`]: Uploader trait and the OTLP/HTTP uploader
//! - [`transform`]: Grouping of loose spans into OTLP records
//! - [`proto`]: OpenTelemetry protobuf types
//! - [`clock`]: Wall-clock sources
//! - [`config`]: Writer configuration
//! - [`error`]: Error types

pub mod clock;
pub mod config;
pub mod error;
pub mod frame;
pub mod naming;
pub mod proto;
pub mod replay;
pub mod retention;
mod rotation;
pub mod transform;
pub mod upload;
pub mod writer;

// Re-export primary API types at crate root for convenience.
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SpoolConfig;
pub use error::{Result, SpoolError};
pub use frame::{EncodeOptions, FrameReader};
pub use replay::{
    FileSummary, ReplayOrder, ReplayStats, inspect_file, replay_file, replay_folder,
    replay_folder_with, replay_spool,
};
pub use upload::Uploader;
#[cfg(feature = "otlp-http")]
pub use upload::{OtlpHttpConfig, OtlpHttpUploader};
pub use writer::{ExportOutcome, SpoolStats, SpoolWriter};
