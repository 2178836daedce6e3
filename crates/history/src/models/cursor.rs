//! Resume cursor for incremental history sync

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Point in time below which history rows are not re-emitted
///
/// Derived from the first row of the most recent output file. Rows that share
/// the cursor's exact second and were already written by that file are listed
/// in `boundary_hashes` so a rerun with no new history writes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeCursor {
    /// Earliest timestamp that is still emitted
    pub at: DateTime<Utc>,
    /// Hashes of rows already written at exactly `at`
    pub boundary_hashes: HashSet<u32>,
}

impl ResumeCursor {
    /// Cursor at a point in time with no already-written boundary rows
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            at,
            boundary_hashes: HashSet::new(),
        }
    }

    /// Default cursor when there is no previous output: one day before `now`
    pub fn yesterday(now: DateTime<Utc>) -> Self {
        Self::at(now - Duration::days(1))
    }

    pub fn with_boundary_hashes(mut self, hashes: impl IntoIterator<Item = u32>) -> Self {
        self.boundary_hashes.extend(hashes);
        self
    }

    /// Whether a row with this timestamp and hash should be written
    pub fn admits(&self, timestamp: DateTime<Utc>, hash: u32) -> bool {
        if timestamp < self.at {
            return false;
        }
        !(timestamp == self.at && self.boundary_hashes.contains(&hash))
    }

    /// Whether paging should continue after observing this timestamp
    pub fn still_ahead_of(&self, observed: DateTime<Utc>) -> bool {
        self.at <= observed
    }
}
