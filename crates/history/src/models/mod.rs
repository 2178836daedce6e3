//! Domain models for router history sync

mod client;
mod cursor;
mod record;
mod session;

pub use client::{ClientDirectory, ClientEntry};
pub use cursor::ResumeCursor;
pub use record::{HistoryRow, MAC_FIELD, TIMESTAMP_FIELD};
pub use session::SessionToken;
