//! ASUS router admin interface integration
//!
//! This module provides:
//! - Session login against `login.cgi`
//! - HTTP client for the client list and web-history endpoints
//! - A restricted parser for the script-literal history payload
//! - Row normalization to the CSV output format

mod auth;
mod client;
mod literal;
mod normalize;

use anyhow::Result;

use crate::models::{ClientDirectory, SessionToken};

pub use auth::{login_form, parse_cookie, token_from_set_cookie};
pub use client::{RouterClient, client_directory};
pub use literal::{LiteralError, parse_history_payload};
pub use normalize::{
    DEFAULT_DATE_FORMAT, DisplayZone, Normalized, NormalizedRecord, Normalizer,
    is_valid_date_format, looks_like_mac, stable_hash,
};

/// Operations the sync driver needs from the router
///
/// Implemented over HTTP by [`RouterClient`]; tests provide in-memory routers.
/// Every call is a single attempt. Failures are returned as errors and the
/// driver decides whether they end the run.
pub trait RouterApi {
    /// Exchange credentials for a session token
    fn login(&self, username: &str, password: &str) -> Result<SessionToken>;

    /// Fetch the directory of known clients
    fn client_list(&self, token: &SessionToken) -> Result<ClientDirectory>;

    /// Fetch the raw script payload for one page of web history (1-based)
    fn history_page(&self, token: &SessionToken, page: u32) -> Result<String>;
}

/// Router API response types
pub mod api {
    use serde::Deserialize;

    /// Response from `appGet.cgi?hook=get_clientlist()`
    ///
    /// Besides one object per MAC address the router mixes in bookkeeping
    /// members such as `maclist`, so values are kept untyped until filtered.
    #[derive(Debug, Deserialize)]
    pub struct ClientListResponse {
        #[serde(default)]
        pub get_clientlist: serde_json::Map<String, serde_json::Value>,
    }
}
