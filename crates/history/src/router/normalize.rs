//! History row normalization
//!
//! Converts raw router rows into delimited output lines:
//! `hash, mac, name, ip, unix_seconds, date_time, <remaining raw fields>`.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::LazyLock;

use crate::models::{ClientDirectory, HistoryRow, ResumeCursor};

/// Default `strftime` format for the human-readable timestamp column
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static MAC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9a-fA-F]{2}[:.-]){5}[0-9a-fA-F]{2}$").expect("MAC pattern is valid")
});

/// Whether a string has the shape of a MAC address
///
/// The router fills in the MAC as nickname for devices nobody has named.
pub fn looks_like_mac(s: &str) -> bool {
    MAC_PATTERN.is_match(s)
}

/// Stable 31-bit hash of a row's raw content
///
/// Polynomial (×31) hash over the UTF-16 code units of the concatenated
/// fields with 32-bit wrapping, masked to 31 bits. Order- and case-sensitive,
/// and identical across runs, platforms and builds.
pub fn stable_hash<S: AsRef<str>>(fields: &[S]) -> u32 {
    let hash = fields
        .iter()
        .flat_map(|f| f.as_ref().encode_utf16())
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    (hash as u32) & 0x7fff_ffff
}

/// Whether chrono can render every specifier in `format`
pub fn is_valid_date_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Time zone used to render the human-readable timestamp column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayZone {
    #[default]
    Local,
    Utc,
}

impl DisplayZone {
    /// Render `at` with a `strftime` format, `None` if the format is invalid
    pub fn format(&self, at: DateTime<Utc>, format: &str) -> Option<String> {
        let mut out = String::new();
        let written = match self {
            DisplayZone::Local => {
                write!(out, "{}", at.with_timezone(&chrono::Local).format(format))
            }
            DisplayZone::Utc => write!(out, "{}", at.format(format)),
        };
        written.ok().map(|_| out)
    }
}

/// A row that passed the resume cursor, rendered for output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub hash: u32,
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

/// Outcome of normalizing one raw row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// Row to write
    Line(NormalizedRecord),
    /// Row older than the cursor (or already written at the cursor)
    BelowCursor { timestamp: DateTime<Utc> },
    /// Row without a usable timestamp
    Malformed(String),
}

/// Renders raw rows as delimited output lines
#[derive(Debug, Clone)]
pub struct Normalizer {
    delimiter: String,
    zone: DisplayZone,
    date_format: String,
}

impl Normalizer {
    pub fn new(
        delimiter: impl Into<String>,
        zone: DisplayZone,
        date_format: impl Into<String>,
    ) -> Self {
        Self {
            delimiter: delimiter.into(),
            zone,
            date_format: date_format.into(),
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Normalize one row against the client directory and resume cursor
    ///
    /// A missing directory, empty MAC or unknown device leaves the name and
    /// IP columns empty; the column layout never changes.
    pub fn normalize(
        &self,
        row: &HistoryRow,
        directory: Option<&ClientDirectory>,
        cursor: &ResumeCursor,
    ) -> Normalized {
        let Some(raw_timestamp) = row.raw_timestamp() else {
            return Normalized::Malformed(format!(
                "row has {} field(s), expected at least 2",
                row.len()
            ));
        };
        let Some(timestamp) = row
            .timestamp_secs()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        else {
            return Normalized::Malformed(format!("invalid timestamp {:?}", raw_timestamp));
        };

        let hash = stable_hash(row.fields());
        if !cursor.admits(timestamp, hash) {
            return Normalized::BelowCursor { timestamp };
        }

        let Some(date_time) = self.zone.format(timestamp, &self.date_format) else {
            return Normalized::Malformed(format!("invalid date format {:?}", self.date_format));
        };
        let (name, ip) = resolve_identity(row.mac(), directory);

        let mut columns: Vec<String> = Vec::with_capacity(row.len() + 4);
        columns.push(hash.to_string());
        columns.push(row.mac().to_string());
        columns.push(name);
        columns.push(ip);
        columns.push(raw_timestamp.to_string());
        columns.push(date_time);
        columns.extend(row.trailing().iter().cloned());

        let line = columns
            .iter()
            .map(|c| sanitize_column(c, &self.delimiter))
            .collect::<Vec<_>>()
            .join(&self.delimiter);

        Normalized::Line(NormalizedRecord {
            hash,
            timestamp,
            line,
        })
    }
}

/// Resolve `(name, ip)` for a MAC, preferring a real nickname over the name
fn resolve_identity(mac: &str, directory: Option<&ClientDirectory>) -> (String, String) {
    let Some(entry) = directory
        .filter(|_| !mac.is_empty())
        .and_then(|dir| dir.lookup(mac))
    else {
        return (String::new(), String::new());
    };

    let nickname = entry.nickname.trim();
    let name = if nickname.is_empty() || looks_like_mac(nickname) {
        entry.name.clone()
    } else {
        nickname.to_string()
    };

    (name, entry.ip.clone())
}

/// Keep every record on one line and every value in its own column
fn sanitize_column(field: &str, delimiter: &str) -> String {
    let field = if field.contains(['\n', '\r']) {
        field.replace(['\n', '\r'], " ")
    } else {
        field.to_string()
    };
    if field.contains(delimiter) {
        field.replace(delimiter, " ")
    } else {
        field
    }
}
