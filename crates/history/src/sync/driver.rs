//! Web-history sync driver
//!
//! One pass: resolve the resume cursor, log in, fetch the client list, then
//! page through history until the page limit is hit or the router starts
//! returning rows older than the cursor.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

use super::output::OutputFile;
use super::resume::resolve_resume_point;
use crate::models::{ClientDirectory, ResumeCursor, SessionToken};
use crate::router::{
    DisplayZone, Normalized, Normalizer, RouterApi, is_valid_date_format, parse_history_payload,
};

/// Terminal failure of a sync run
#[derive(Debug, Error)]
pub enum SyncError {
    /// Login failed or returned no session cookie
    #[error("empty token")]
    EmptyToken,
    /// A history page could not be fetched or parsed
    #[error("no code (page {page}): {reason}")]
    NoCode { page: u32, reason: String },
    /// Writing the output file failed
    #[error("failed to write {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The output folder could not be inspected or the output file created
    #[error("{0:#}")]
    OutputFolder(anyhow::Error),
    /// The date column format has a specifier chrono can't render
    #[error("invalid date format {0:?}")]
    DateFormat(String),
}

/// Phases of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Pending,
    Authenticating,
    DirectoryFetch,
    Paging { page: u32 },
    Done,
    Aborted,
}

/// Everything a sync run needs, passed in explicitly
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub username: String,
    pub password: String,
    /// Upper bound on history pages fetched (1-based, inclusive)
    pub max_pages: u32,
    /// Overrides the resume cursor derived from previous output
    pub from: Option<DateTime<Utc>>,
    pub delimiter: String,
    pub output_folder: PathBuf,
    /// Run start; names the output file and anchors the "yesterday" default
    pub started_at: DateTime<Utc>,
    pub zone: DisplayZone,
    pub date_format: String,
    /// Print each page's lines to stdout as they are written
    pub echo: bool,
}

/// Statistics from a sync run
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    /// Number of history pages fetched
    pub pages_fetched: u32,
    /// Number of raw rows seen across all pages
    pub rows_seen: usize,
    /// Number of lines appended to the output file
    pub rows_written: usize,
    /// Number of rows dropped as older than the resume cursor
    pub rows_below_cursor: usize,
    /// Number of rows dropped for a missing or invalid timestamp
    pub rows_malformed: usize,
    /// Client list size, `None` if it could not be fetched
    pub directory_entries: Option<usize>,
    /// Cursor the run resumed from
    pub resumed_from: Option<DateTime<Utc>>,
    /// Output file of this run
    pub output_path: Option<PathBuf>,
    /// Duration of the sync operation
    pub duration_ms: u64,
}

/// Drives one sync pass against a router
pub struct SyncDriver<'a> {
    router: &'a dyn RouterApi,
    options: SyncOptions,
    phase: SyncPhase,
}

impl<'a> SyncDriver<'a> {
    pub fn new(router: &'a dyn RouterApi, options: SyncOptions) -> Self {
        Self {
            router,
            options,
            phase: SyncPhase::Pending,
        }
    }

    /// Current phase (after [`run`](Self::run) returns: `Done` or `Aborted`)
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    fn transition(&mut self, next: SyncPhase) {
        info!("sync: {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn abort(&mut self, err: SyncError) -> SyncError {
        self.transition(SyncPhase::Aborted);
        error!("Sync aborted: {}", err);
        err
    }

    /// Run the sync pass
    pub fn run(&mut self) -> Result<SyncStats, SyncError> {
        let start = Instant::now();
        let mut stats = SyncStats::default();

        if !is_valid_date_format(&self.options.date_format) {
            let format = self.options.date_format.clone();
            return Err(self.abort(SyncError::DateFormat(format)));
        }

        let cursor = match self.options.from {
            Some(at) => ResumeCursor::at(at),
            None => resolve_resume_point(
                &self.options.output_folder,
                &self.options.delimiter,
                self.options.started_at,
            )
            .map_err(|e| self.abort(SyncError::OutputFolder(e)))?,
        };
        info!("Resuming from {}", cursor.at);
        stats.resumed_from = Some(cursor.at);

        let mut output = OutputFile::create(&self.options.output_folder, self.options.started_at)
            .map_err(|e| self.abort(SyncError::OutputFolder(e)))?;
        info!("Writing to {}", output.path().display());
        stats.output_path = Some(output.path().to_path_buf());

        self.transition(SyncPhase::Authenticating);
        let token = self.authenticate()?;

        self.transition(SyncPhase::DirectoryFetch);
        let directory = self.fetch_directory(&token);
        stats.directory_entries = directory.as_ref().map(ClientDirectory::len);

        self.page_through(&token, directory.as_ref(), &cursor, &mut output, &mut stats)?;

        self.transition(SyncPhase::Done);
        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Sync done: {} page(s), {} row(s) written, {} below cursor, {} malformed",
            stats.pages_fetched, stats.rows_written, stats.rows_below_cursor, stats.rows_malformed
        );
        Ok(stats)
    }

    fn authenticate(&mut self) -> Result<SessionToken, SyncError> {
        match self
            .router
            .login(&self.options.username, &self.options.password)
        {
            Ok(token) if !token.is_empty() => Ok(token),
            Ok(_) => Err(self.abort(SyncError::EmptyToken)),
            Err(e) => {
                error!("Login failed: {:#}", e);
                Err(self.abort(SyncError::EmptyToken))
            }
        }
    }

    /// Client list failures only degrade enrichment
    fn fetch_directory(&mut self, token: &SessionToken) -> Option<ClientDirectory> {
        match self.router.client_list(token) {
            Ok(directory) => {
                debug!("Client list: {} device(s)", directory.len());
                Some(directory)
            }
            Err(e) => {
                warn!("Client list unavailable, rows will not be enriched: {:#}", e);
                None
            }
        }
    }

    fn page_through(
        &mut self,
        token: &SessionToken,
        directory: Option<&ClientDirectory>,
        cursor: &ResumeCursor,
        output: &mut OutputFile,
        stats: &mut SyncStats,
    ) -> Result<(), SyncError> {
        let normalizer = Normalizer::new(
            self.options.delimiter.clone(),
            self.options.zone,
            self.options.date_format.clone(),
        );
        let mut observed = self.options.started_at;
        let mut page = 1;

        while page <= self.options.max_pages && cursor.still_ahead_of(observed) {
            self.transition(SyncPhase::Paging { page });

            let payload = match self.router.history_page(token, page) {
                Ok(payload) if !payload.trim().is_empty() => payload,
                Ok(_) => {
                    return Err(self.abort(SyncError::NoCode {
                        page,
                        reason: "empty response".to_string(),
                    }));
                }
                Err(e) => {
                    return Err(self.abort(SyncError::NoCode {
                        page,
                        reason: format!("{:#}", e),
                    }));
                }
            };
            stats.pages_fetched += 1;

            let rows = parse_history_payload(&payload).map_err(|e| {
                self.abort(SyncError::NoCode {
                    page,
                    reason: format!("malformed payload: {}", e),
                })
            })?;
            if rows.is_empty() {
                info!("Page {} has no rows, end of history", page);
                break;
            }

            let mut lines = Vec::with_capacity(rows.len());
            // Oldest timestamp on the page; rows are not assumed to be ordered
            let mut oldest: Option<DateTime<Utc>> = None;

            for row in &rows {
                stats.rows_seen += 1;
                match normalizer.normalize(row, directory, cursor) {
                    Normalized::Line(record) => {
                        oldest = Some(oldest.map_or(record.timestamp, |o| o.min(record.timestamp)));
                        lines.push(record.line);
                    }
                    Normalized::BelowCursor { timestamp } => {
                        oldest = Some(oldest.map_or(timestamp, |o| o.min(timestamp)));
                        stats.rows_below_cursor += 1;
                    }
                    Normalized::Malformed(reason) => {
                        warn!("Page {}: skipping row: {}", page, reason);
                        stats.rows_malformed += 1;
                    }
                }
            }

            for line in &lines {
                debug!("page {}: {}", page, line);
                if self.options.echo {
                    println!("{}", line);
                }
            }

            if let Err(source) = output.append(&lines) {
                let path = output.path().to_path_buf();
                return Err(self.abort(SyncError::Output { path, source }));
            }
            stats.rows_written += lines.len();
            debug!("Page {}: {} row(s), {} written", page, rows.len(), lines.len());

            if let Some(oldest) = oldest {
                observed = oldest;
            }
            page += 1;
        }

        Ok(())
    }
}

/// Run one sync pass with the given router and options
pub fn sync_history(router: &dyn RouterApi, options: SyncOptions) -> Result<SyncStats, SyncError> {
    SyncDriver::new(router, options).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::DEFAULT_DATE_FORMAT;
    use anyhow::Result;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct PagedRouter {
        pages: Vec<String>,
        requested: RefCell<Vec<u32>>,
    }

    impl RouterApi for PagedRouter {
        fn login(&self, _: &str, _: &str) -> Result<SessionToken> {
            Ok(SessionToken::new("tok"))
        }

        fn client_list(&self, _: &SessionToken) -> Result<ClientDirectory> {
            anyhow::bail!("client list disabled")
        }

        fn history_page(&self, _: &SessionToken, page: u32) -> Result<String> {
            self.requested.borrow_mut().push(page);
            Ok(self
                .pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_else(|| "array_temp = [];".to_string()))
        }
    }

    fn options(folder: &TempDir, from: i64) -> SyncOptions {
        SyncOptions {
            username: "admin".to_string(),
            password: "pw".to_string(),
            max_pages: 10,
            from: Some(Utc.timestamp_opt(from, 0).unwrap()),
            delimiter: ";".to_string(),
            output_folder: folder.path().to_path_buf(),
            started_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            zone: DisplayZone::Utc,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            echo: false,
        }
    }

    #[test]
    fn test_mixed_order_page_keeps_rows_at_or_after_cursor() {
        let dir = TempDir::new().unwrap();
        let router = PagedRouter {
            pages: vec![
                "x = [['m','1000','a'],['m','900','b'],['m','1100','c']];".to_string(),
                "x = [['m','1200','d']];".to_string(),
            ],
            requested: RefCell::new(Vec::new()),
        };

        let mut driver = SyncDriver::new(&router, options(&dir, 950));
        let stats = driver.run().unwrap();

        assert_eq!(driver.phase(), SyncPhase::Done);
        assert_eq!(stats.rows_written, 2);
        assert_eq!(stats.rows_below_cursor, 1);
        // The page dipped below the cursor, so page 2 is never requested
        assert_eq!(*router.requested.borrow(), vec![1]);
    }

    #[test]
    fn test_malformed_rows_are_counted_not_fatal() {
        let dir = TempDir::new().unwrap();
        let router = PagedRouter {
            pages: vec!["x = [['m'],['m','later','b'],['m','1000','c']];".to_string()],
            requested: RefCell::new(Vec::new()),
        };

        let stats = sync_history(&router, options(&dir, 0)).unwrap();
        assert_eq!(stats.rows_malformed, 2);
        assert_eq!(stats.rows_written, 1);
        assert_eq!(stats.directory_entries, None);
    }

    #[test]
    fn test_malformed_payload_is_no_code() {
        let dir = TempDir::new().unwrap();
        let router = PagedRouter {
            pages: vec!["x = [['m','1000','a']]; alert(1)".to_string()],
            requested: RefCell::new(Vec::new()),
        };

        let mut driver = SyncDriver::new(&router, options(&dir, 0));
        let err = driver.run().unwrap_err();
        assert!(matches!(err, SyncError::NoCode { page: 1, .. }));
        assert_eq!(driver.phase(), SyncPhase::Aborted);
    }

    #[test]
    fn test_empty_page_ends_sync() {
        let dir = TempDir::new().unwrap();
        let router = PagedRouter {
            pages: vec!["x = [['m','1000','a']];".to_string()],
            requested: RefCell::new(Vec::new()),
        };

        let stats = sync_history(&router, options(&dir, 0)).unwrap();
        assert_eq!(stats.pages_fetched, 2);
        assert_eq!(*router.requested.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_invalid_date_format_aborts_before_any_output() {
        let dir = TempDir::new().unwrap();
        let router = PagedRouter {
            pages: vec!["x = [['m','1000','a']];".to_string()],
            requested: RefCell::new(Vec::new()),
        };
        let options = SyncOptions {
            date_format: "%Y %Q".to_string(),
            ..options(&dir, 0)
        };

        let mut driver = SyncDriver::new(&router, options);
        let err = driver.run().unwrap_err();
        assert!(matches!(err, SyncError::DateFormat(_)));
        assert_eq!(driver.phase(), SyncPhase::Aborted);
        assert!(router.requested.borrow().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
