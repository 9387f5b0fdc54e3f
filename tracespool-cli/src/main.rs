//! CLI for tracespool spool folders.
//!
//! Provides commands for replaying spooled span batches to an OTLP/HTTP
//! collector and for inspecting the on-disk layout.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracespool::naming::{self, INDEX_FILE_NAME, MARKER_FILE_NAME};
use tracespool::{OtlpHttpConfig, OtlpHttpUploader, ReplayOrder, ReplayStats, Uploader};

/// Default OTLP/HTTP trace endpoint.
const DEFAULT_ENDPOINT: &str = "http://[::1]:4318/v1/traces";

/// Replay and inspect on-disk span spools.
#[derive(Parser)]
#[command(name = "tracespool", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Upload spooled batches from files or folders to a collector.
    Import {
        /// OTLP/HTTP trace endpoint.
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Extra HTTP header as `NAME=VALUE` (repeatable).
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Replay folder files by serial instead of directory listing order.
        #[arg(long)]
        sorted: bool,

        /// Segment files or hour folders to import.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Display hour folders, segment files, index records, and markers.
    Info {
        /// Spool base folder, hour folder, or segment file.
        path: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Import {
            endpoint,
            headers,
            sorted,
            paths,
        } => cmd_import(&endpoint, headers, sorted, &paths),
        Commands::Info { path } => cmd_info(&path),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Parses a `NAME=VALUE` header argument.
fn parse_header(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{arg}'")),
    }
}

/// Implements `tracespool import [--endpoint URL] [--header K=V]... PATH...`.
fn cmd_import(
    endpoint: &str,
    headers: Vec<(String, String)>,
    sorted: bool,
    paths: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = OtlpHttpConfig::new(endpoint);
    for (name, value) in headers {
        config = config.with_header(name, value);
    }
    let mut uploader = OtlpHttpUploader::new(config)?;
    let order = if sorted {
        ReplayOrder::Serial
    } else {
        ReplayOrder::Listing
    };

    let failed = import_paths(paths, &mut uploader, order);
    if failed > 0 {
        return Err(format!("{failed} of {} paths failed to import", paths.len()).into());
    }
    info!("completed");
    Ok(())
}

/// Replays each path in turn; returns the number of paths that failed.
///
/// Directories are replayed as folders and regular files as segment files.
/// Anything else, symlinks included, is skipped with a warning.
fn import_paths<U: Uploader + ?Sized>(
    paths: &[PathBuf],
    uploader: &mut U,
    order: ReplayOrder,
) -> usize {
    let mut failed = 0;

    for path in paths {
        let metadata = match std::fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot read meta of target path");
                failed += 1;
                continue;
            }
        };

        let result = if metadata.is_dir() {
            info!(path = %path.display(), "import trace folder");
            tracespool::replay_folder_with(path, uploader, order)
        } else if metadata.file_type().is_file() {
            info!(path = %path.display(), "import trace file");
            tracespool::replay_file(path, uploader)
        } else {
            warn!(path = %path.display(), "skip unsupported target path");
            continue;
        };

        match result {
            Ok(ReplayStats {
                files,
                batches,
                records,
            }) => info!(path = %path.display(), files, batches, records, "imported"),
            Err(e) => {
                error!(path = %path.display(), error = %e, "import failed");
                failed += 1;
            }
        }
    }

    failed
}

/// Implements `tracespool info <path>`.
fn cmd_info(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let metadata = std::fs::symlink_metadata(path)
        .map_err(|e| format!("cannot read '{}': {e}", path.display()))?;

    if metadata.is_file() {
        print_segment(path);
        return Ok(());
    }

    let folders = tracespool::replay::hour_folders(path)?;
    if folders.is_empty() {
        let hour = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(naming::parse_folder_name);
        print_folder(path, hour)?;
        return Ok(());
    }

    println!("Spool: {}", path.display());
    println!("Hour folders: {}", folders.len());
    for (hour, folder) in &folders {
        println!();
        print_folder(folder, Some(*hour))?;
    }
    Ok(())
}

/// Prints one hour folder: segments by serial, index records, marker.
fn print_folder(folder: &Path, hour: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Folder: {}", folder.display());
    if let Some(hour) = hour {
        println!("  Hour: {hour} ({})", hour_start(hour));
    }

    let mut segments = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(serial) = naming::parse_file_name(&name) {
            segments.push((serial, entry.path()));
        }
    }
    segments.sort_unstable_by_key(|(serial, _)| *serial);

    println!("  Segments: {}", segments.len());
    for (serial, path) in &segments {
        print!("    serial={serial} ");
        print_segment(path);
    }

    match std::fs::read_to_string(folder.join(INDEX_FILE_NAME)) {
        Ok(index) => {
            println!("  Index:");
            for line in index.lines() {
                println!("    {line}");
            }
        }
        Err(_) => println!("  Index: none"),
    }

    match std::fs::read_to_string(folder.join(MARKER_FILE_NAME)) {
        Ok(marker) => {
            let retired = marker.lines().nth(2).unwrap_or("unreadable");
            println!("  Retired: {retired}");
        }
        Err(_) => println!("  Retired: no"),
    }

    Ok(())
}

fn print_segment(path: &Path) {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    match tracespool::inspect_file(path) {
        Ok(summary) => println!(
            "{} ({}): batches={}, records={}",
            path.display(),
            format_bytes(size),
            summary.batches,
            summary.records
        ),
        Err(e) => println!("{} ({}): {e}", path.display(), format_bytes(size)),
    }
}

/// Formats the start of a (masked) hour bucket as RFC 3339.
fn hour_start(hour: u32) -> String {
    DateTime::from_timestamp(i64::from(hour) * 3600, 0).map_or_else(
        || "out of range".to_string(),
        |t| t.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
