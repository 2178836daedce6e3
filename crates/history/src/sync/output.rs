//! Append-only CSV output file for one sync run

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Output file name prefix
pub const FILE_PREFIX: &str = "History-";
/// Output file extension (including the dot)
pub const FILE_EXTENSION: &str = ".csv";

/// File name for a run started at `started_at`: `History-YYYYMMDDHHmmss.csv` (local time)
pub fn output_file_name(started_at: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        FILE_PREFIX,
        started_at.with_timezone(&Local).format("%Y%m%d%H%M%S"),
        FILE_EXTENSION
    )
}

/// Output file opened in append mode
///
/// Each page is written with a single `write_all` of complete,
/// newline-terminated lines, so a concurrent reader never sees half a record
/// from this process.
pub struct OutputFile {
    path: PathBuf,
    file: File,
}

impl OutputFile {
    /// Create (or reopen for append) the run's output file, creating the folder if needed
    pub fn create(folder: &Path, started_at: DateTime<Utc>) -> Result<Self> {
        fs::create_dir_all(folder)
            .with_context(|| format!("Failed to create output folder: {}", folder.display()))?;

        let path = folder.join(output_file_name(started_at));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open output file: {}", path.display()))?;

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append lines as one chunk; no-op when `lines` is empty
    pub fn append(&mut self, lines: &[String]) -> io::Result<()> {
        if lines.is_empty() {
            return Ok(());
        }

        let capacity = lines.iter().map(|l| l.len() + 1).sum();
        let mut chunk = String::with_capacity(capacity);
        for line in lines {
            chunk.push_str(line);
            chunk.push('\n');
        }

        self.file.write_all(chunk.as_bytes())?;
        self.file.flush()
    }
}
