//! Sync engine for fetching router history into CSV files
//!
//! Each run resumes from the newest previous output file and appends to a
//! fresh file of its own.

mod driver;
mod output;
mod resume;

pub use driver::{SyncDriver, SyncError, SyncOptions, SyncPhase, SyncStats, sync_history};
pub use output::{FILE_EXTENSION, FILE_PREFIX, OutputFile, output_file_name};
pub use resume::resolve_resume_point;
