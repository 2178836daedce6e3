//! History crate - Incremental web-history sync for ASUS routers
//!
//! The router's admin UI shows which hosts each client visited but keeps no
//! long-term record. This crate provides:
//! - Domain models (session token, client directory, history rows, resume cursor)
//! - Router admin HTTP client (login, client list, web-history pages)
//! - A restricted parser for the script-literal history payload
//! - Row normalization to delimited output lines
//! - A resumable sync driver appending to per-run CSV files
//!
//! The HTTP layer sits behind the [`RouterApi`] trait so the sync engine can
//! run against in-memory routers.

pub mod models;
pub mod router;
pub mod settings;
pub mod sync;

pub use models::{ClientDirectory, ClientEntry, HistoryRow, ResumeCursor, SessionToken};
pub use router::{
    DisplayZone, LiteralError, Normalized, Normalizer, RouterApi, RouterClient,
    parse_history_payload, stable_hash,
};
pub use settings::{SettingsOverrides, SyncSettings, parse_from_date, save_settings};
pub use sync::{
    OutputFile, SyncDriver, SyncError, SyncOptions, SyncPhase, SyncStats,
    resolve_resume_point, sync_history,
};
