//! Settings for history sync
//!
//! Settings are layered (later wins):
//! 1. Built-in defaults
//! 2. JSON file (~/.config/routerlog/settings.json, or an explicit path)
//! 3. Environment variables (`ROUTERLOG_*`)
//! 4. Command-line overrides supplied by the caller

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::router::{DEFAULT_DATE_FORMAT, DisplayZone, is_valid_date_format};
use crate::sync::SyncOptions;

/// Settings filename in the routerlog config directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Router address used by ASUS firmware on the LAN side
pub const DEFAULT_BASE_URL: &str = "http://router.asus.com/";
/// Upper bound on pages per run when nothing else is configured
pub const DEFAULT_MAX_PAGES: u32 = 500;
pub const DEFAULT_DELIMITER: &str = ";";
/// Output folder under the user's home directory
const DEFAULT_OUTPUT_DIR: &str = "asusdata";

/// Partial settings as found in the settings file, environment or CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_folder: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<DisplayZone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
}

impl SettingsOverrides {
    /// Read `ROUTERLOG_*` variables through `lookup`
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let max_pages = lookup("ROUTERLOG_MAX_PAGES")
            .map(|v| {
                v.trim()
                    .parse::<u32>()
                    .with_context(|| format!("ROUTERLOG_MAX_PAGES is not a number: {}", v))
            })
            .transpose()?;
        let time_zone = lookup("ROUTERLOG_TIME_ZONE")
            .map(|v| match v.trim().to_ascii_lowercase().as_str() {
                "local" => Ok(DisplayZone::Local),
                "utc" => Ok(DisplayZone::Utc),
                other => {
                    anyhow::bail!("ROUTERLOG_TIME_ZONE must be 'local' or 'utc', got {}", other)
                }
            })
            .transpose()?;

        Ok(Self {
            base_url: lookup("ROUTERLOG_BASE_URL"),
            username: lookup("ROUTERLOG_USERNAME"),
            password: lookup("ROUTERLOG_PASSWORD"),
            max_pages,
            from_date: lookup("ROUTERLOG_FROM_DATE"),
            delimiter: lookup("ROUTERLOG_DELIMITER"),
            output_folder: lookup("ROUTERLOG_OUTPUT_FOLDER").map(PathBuf::from),
            time_zone,
            date_format: lookup("ROUTERLOG_DATE_FORMAT"),
        })
    }

    /// Read `ROUTERLOG_*` variables from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Layer `other` on top of `self`, keeping values `other` leaves unset
    pub fn merge(self, other: SettingsOverrides) -> Self {
        Self {
            base_url: other.base_url.or(self.base_url),
            username: other.username.or(self.username),
            password: other.password.or(self.password),
            max_pages: other.max_pages.or(self.max_pages),
            from_date: other.from_date.or(self.from_date),
            delimiter: other.delimiter.or(self.delimiter),
            output_folder: other.output_folder.or(self.output_folder),
            time_zone: other.time_zone.or(self.time_zone),
            date_format: other.date_format.or(self.date_format),
        }
    }
}

/// Merge `overrides` into the settings file at `path` and write it back
///
/// Without `path` the default settings file is used. Returns the file written.
pub fn save_settings(path: Option<&Path>, overrides: SettingsOverrides) -> Result<PathBuf> {
    let existing: Option<SettingsOverrides> = match path {
        Some(path) if path.exists() => Some(config::load_json_file(path)?),
        Some(_) => None,
        None => config::load_json(SETTINGS_FILE)?,
    };
    let merged = existing.unwrap_or_default().merge(overrides);

    // Reject what a later run would fail to load
    SyncSettings::default().apply(merged.clone())?;

    match path {
        Some(path) => {
            config::save_json_file(path, &merged)?;
            Ok(path.to_path_buf())
        }
        None => config::save_json(SETTINGS_FILE, &merged),
    }
}

/// Fully resolved settings for one run
#[derive(Clone, PartialEq)]
pub struct SyncSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub max_pages: u32,
    pub from_date: Option<DateTime<Utc>>,
    pub delimiter: String,
    pub output_folder: PathBuf,
    pub time_zone: DisplayZone,
    pub date_format: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            username: String::new(),
            password: String::new(),
            max_pages: DEFAULT_MAX_PAGES,
            from_date: None,
            delimiter: DEFAULT_DELIMITER.to_string(),
            output_folder: config::home_path(DEFAULT_OUTPUT_DIR)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            time_zone: DisplayZone::default(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl fmt::Debug for SyncSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSettings")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("max_pages", &self.max_pages)
            .field("from_date", &self.from_date)
            .field("delimiter", &self.delimiter)
            .field("output_folder", &self.output_folder)
            .field("time_zone", &self.time_zone)
            .field("date_format", &self.date_format)
            .finish()
    }
}

impl SyncSettings {
    /// Load defaults, then the settings file, then the environment
    ///
    /// With `path` set the file must exist; otherwise the default settings
    /// file is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();

        match path {
            Some(path) => {
                let file: SettingsOverrides = config::load_json_file(path)?;
                settings.apply(file)?;
            }
            None => {
                if let Some(file) = config::load_json::<SettingsOverrides>(SETTINGS_FILE)? {
                    settings.apply(file)?;
                }
            }
        }

        settings.apply(SettingsOverrides::from_env()?)?;
        Ok(settings)
    }

    /// Apply the values present in `overrides`
    pub fn apply(&mut self, overrides: SettingsOverrides) -> Result<()> {
        if let Some(base_url) = overrides.base_url {
            self.base_url = base_url;
        }
        if let Some(username) = overrides.username {
            self.username = username;
        }
        if let Some(password) = overrides.password {
            self.password = password;
        }
        if let Some(max_pages) = overrides.max_pages {
            self.max_pages = max_pages;
        }
        if let Some(from_date) = overrides.from_date {
            self.from_date = Some(parse_from_date(&from_date)?);
        }
        if let Some(delimiter) = overrides.delimiter {
            self.delimiter = delimiter;
        }
        if let Some(output_folder) = overrides.output_folder {
            self.output_folder = output_folder;
        }
        if let Some(time_zone) = overrides.time_zone {
            self.time_zone = time_zone;
        }
        if let Some(date_format) = overrides.date_format {
            self.date_format = date_format;
        }
        Ok(())
    }

    /// Check that a run can be attempted with these settings
    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            anyhow::bail!("No username configured (set ROUTERLOG_USERNAME or use --username)");
        }
        if self.password.is_empty() {
            anyhow::bail!("No password configured (set ROUTERLOG_PASSWORD or use --password)");
        }
        if self.max_pages == 0 {
            anyhow::bail!("maxPages must be at least 1");
        }
        if self.delimiter.is_empty() || self.delimiter.contains(['\n', '\r']) {
            anyhow::bail!("Delimiter must be non-empty and on a single line");
        }
        // MACs, IPs and timestamps would be split by these
        if self
            .delimiter
            .contains(|c: char| c.is_ascii_hexdigit() || matches!(c, ':' | '.' | '-'))
        {
            anyhow::bail!(
                "Delimiter {:?} may occur in MAC, IP or timestamp columns",
                self.delimiter
            );
        }
        if !is_valid_date_format(&self.date_format) {
            anyhow::bail!("Invalid date format: {:?}", self.date_format);
        }
        if self.base_url.trim().is_empty() {
            anyhow::bail!("No router base URL configured");
        }
        Ok(())
    }

    /// Build the driver options for a run started at `started_at`
    pub fn to_options(&self, started_at: DateTime<Utc>, echo: bool) -> SyncOptions {
        SyncOptions {
            username: self.username.clone(),
            password: self.password.clone(),
            max_pages: self.max_pages,
            from: self.from_date,
            delimiter: self.delimiter.clone(),
            output_folder: self.output_folder.clone(),
            started_at,
            zone: self.time_zone,
            date_format: self.date_format.clone(),
            echo,
        }
    }

    /// Get the default settings file path (~/.config/routerlog/settings.json)
    pub fn default_settings_path() -> Option<PathBuf> {
        config::config_path(SETTINGS_FILE)
    }
}

/// Parse a `fromDate` override
///
/// Accepts unix seconds, RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` or
/// `YYYY/MM/DD` (the last three in local time).
pub fn parse_from_date(input: &str) -> Result<DateTime<Utc>> {
    let s = input.trim();

    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        let secs: i64 = s.parse().context("Unix timestamp out of range")?;
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .with_context(|| format!("Unix timestamp out of range: {}", s));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            ["%Y-%m-%d", "%Y/%m/%d"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .with_context(|| format!("Unrecognized date: {}", input))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Date does not exist in the local time zone: {}", input))
}
