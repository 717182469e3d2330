//! JSONL exporter for [`AuditRecord`] entries.
//!
//! Writes one JSON object per line to an append-only file so an external
//! auditor can replay every committed state change.
//!
//! - Append-only: existing lines are never modified.
//! - The first line of each file is a schema version header.
//! - Files rotate once they exceed a configured size.
//!
//! # Example
//!
//! ```no_run
//! use coldchain_evidence::{AuditEvent, AuditLedger, AuditSink, export::JsonlExporter};
//! use coldchain_kernel::Principal;
//! use std::path::PathBuf;
//!
//! let mut exporter = JsonlExporter::open(PathBuf::from("/tmp/audit.jsonl")).unwrap();
//! let mut ledger = AuditLedger::new();
//! let record = ledger.append(Principal::from_raw(1), AuditEvent::PriorsSet { f1: 90, f2: 90 });
//! exporter.record(record).unwrap();
//! exporter.flush().unwrap();
//! ```

use crate::{AUDIT_SCHEMA_VERSION, AuditRecord, AuditSink};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default maximum file size before rotation (64 MiB).
const DEFAULT_MAX_BYTES: u64 = 64 * 1024 * 1024;

/// Configuration for [`JsonlExporter`].
#[derive(Clone, Debug)]
pub struct ExporterConfig {
    /// Maximum file size in bytes before rotation. Set to 0 to disable rotation.
    pub max_bytes: u64,
    /// Buffer capacity for the writer.
    pub buf_capacity: usize,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            buf_capacity: 8192,
        }
    }
}

/// JSONL exporter for [`AuditRecord`] entries.
pub struct JsonlExporter {
    writer: BufWriter<File>,
    path: PathBuf,
    bytes_written: u64,
    records_written: u64,
    rotations: u32,
    config: ExporterConfig,
}

fn header_line() -> String {
    format!("{{\"_schema\":\"AuditRecord\",\"_version\":\"{AUDIT_SCHEMA_VERSION}\"}}\n")
}

impl JsonlExporter {
    /// Open a JSONL file for appending, writing a schema header if the file is new or empty.
    pub fn open(path: PathBuf) -> io::Result<Self> {
        Self::open_with_config(path, ExporterConfig::default())
    }

    /// Open with explicit configuration.
    pub fn open_with_config(path: PathBuf, config: ExporterConfig) -> io::Result<Self> {
        let existing_size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::with_capacity(config.buf_capacity, file);

        let mut bytes_written = existing_size;
        if existing_size == 0 {
            let header = header_line();
            writer.write_all(header.as_bytes())?;
            bytes_written += header.len() as u64;
        }

        Ok(Self {
            writer,
            path,
            bytes_written,
            records_written: 0,
            rotations: 0,
            config,
        })
    }

    /// Append a single record as a JSONL line.
    ///
    /// Returns the number of bytes written (including the newline).
    pub fn append(&mut self, record: &AuditRecord) -> io::Result<u64> {
        if self.config.max_bytes > 0 && self.bytes_written >= self.config.max_bytes {
            self.rotate()?;
        }

        let json = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let line = format!("{json}\n");
        let line_bytes = line.len() as u64;

        self.writer.write_all(line.as_bytes())?;
        self.bytes_written += line_bytes;
        self.records_written += 1;

        Ok(line_bytes)
    }

    /// Number of records written since this exporter was opened.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Approximate bytes written to the current file.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Number of rotations performed since opening.
    pub fn rotations(&self) -> u32 {
        self.rotations
    }

    /// Path to the current output file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the current file under `{stem}.{n}.jsonl` and start a fresh one.
    ///
    /// `n` is the first unused index, so rotated names never collide even
    /// across restarts.
    fn rotate(&mut self) -> io::Result<()> {
        self.writer.flush()?;

        let stem = self
            .path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let mut index = 1_u32;
        let rotated_path = loop {
            let candidate = self.path.with_file_name(format!("{stem}.{index}.jsonl"));
            if !candidate.exists() {
                break candidate;
            }
            index += 1;
        };
        fs::rename(&self.path, &rotated_path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = BufWriter::with_capacity(self.config.buf_capacity, file);

        let header = header_line();
        self.writer.write_all(header.as_bytes())?;
        self.bytes_written = header.len() as u64;
        self.rotations += 1;

        Ok(())
    }
}

impl AuditSink for JsonlExporter {
    fn record(&mut self, record: &AuditRecord) -> io::Result<()> {
        self.append(record).map(|_| ())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Read a JSONL file, returning parsed records (skipping headers).
///
/// Partial or corrupt lines, typically the tail of a crashed write, are
/// skipped.
pub fn read_jsonl(path: &Path) -> io::Result<Vec<AuditRecord>> {
    let content = fs::read_to_string(path)?;
    let records = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains("\"_schema\""))
        .filter_map(|line| serde_json::from_str::<AuditRecord>(line).ok())
        .collect();
    Ok(records)
}
