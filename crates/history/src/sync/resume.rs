//! Resume-point resolution from previous output files

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, warn};
use regex::Regex;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::models::ResumeCursor;

/// Column of the output line holding the row hash
const HASH_COLUMN: usize = 0;
/// Column of the output line holding the unix timestamp
const TIMESTAMP_COLUMN: usize = 4;

static OUTPUT_FILE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^History-\d+\.csv$").expect("output file pattern is valid"));

/// Determine where this run should resume
///
/// Looks at the most recent `History-*.csv` in `folder` (by the timestamp in
/// its name) and takes the unix timestamp of its first line. Rows written at
/// that exact second are remembered as boundary hashes. Files that are empty
/// or whose first line can't be read fall through to the next most recent.
/// Without any usable file the cursor is one day before `now`.
pub fn resolve_resume_point(
    folder: &Path,
    delimiter: &str,
    now: DateTime<Utc>,
) -> Result<ResumeCursor> {
    for path in output_files_newest_first(folder)? {
        match read_cursor(&path, delimiter) {
            Ok(Some(cursor)) => {
                debug!("Resume point {} from {}", cursor.at, path.display());
                return Ok(cursor);
            }
            Ok(None) => debug!("Skipping {}: no usable first line", path.display()),
            Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
        }
    }

    debug!("No previous output in {}, resuming from yesterday", folder.display());
    Ok(ResumeCursor::yesterday(now))
}

/// Output files in `folder`, most recent first
fn output_files_newest_first(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(folder)
        .with_context(|| format!("Failed to list output folder: {}", folder.display()))?
    {
        let entry = entry?;
        let file_name = entry.file_name();
        if let Some(name) = file_name.to_str()
            && OUTPUT_FILE_PATTERN.is_match(name)
            && entry.file_type().is_ok_and(|t| t.is_file())
        {
            names.push(name.to_string());
        }
    }

    // Fixed-width timestamps in the name sort chronologically
    names.sort_unstable_by(|a, b| b.cmp(a));
    Ok(names.into_iter().map(|n| folder.join(n)).collect())
}

fn read_cursor(path: &Path, delimiter: &str) -> Result<Option<ResumeCursor>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let Some(first) = lines.next().transpose()? else {
        return Ok(None);
    };
    let Some((at, hash)) = parse_line(&first, delimiter) else {
        return Ok(None);
    };

    let mut hashes = vec![hash];
    for line in lines {
        let line = line?;
        match parse_line(&line, delimiter) {
            Some((ts, hash)) if ts == at => hashes.push(hash),
            _ => break,
        }
    }

    Ok(Some(ResumeCursor::at(at).with_boundary_hashes(hashes)))
}

/// Extract `(timestamp, hash)` from an output line
fn parse_line(line: &str, delimiter: &str) -> Option<(DateTime<Utc>, u32)> {
    let columns: Vec<&str> = line.split(delimiter).collect();
    let secs: i64 = columns.get(TIMESTAMP_COLUMN)?.trim().parse().ok()?;
    let at = Utc.timestamp_opt(secs, 0).single()?;
    let hash = columns.get(HASH_COLUMN)?.trim().parse().ok()?;
    Some((at, hash))
}
