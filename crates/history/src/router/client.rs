//! Router admin HTTP client
//!
//! Provides login, client-list and web-history requests against the router.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, error, warn};
use ureq::Agent;
use url::Url;

use super::RouterApi;
use super::api::ClientListResponse;
use crate::models::{ClientDirectory, ClientEntry, SessionToken};

/// HTTP client for one router's admin interface
pub struct RouterClient {
    agent: Agent,
    base: Url,
}

impl RouterClient {
    /// Create a client for the router at `base_url` (e.g. `http://router.asus.com/`)
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            agent: Agent::new_with_defaults(),
            base: normalize_base_url(base_url)?,
        })
    }

    /// Base URL all endpoints are resolved against (always ends with `/`)
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("Invalid endpoint path: {}", path))
    }
}

impl RouterApi for RouterClient {
    fn login(&self, username: &str, password: &str) -> Result<SessionToken> {
        super::auth::login(&self.agent, &self.base, username, password)
    }

    fn client_list(&self, token: &SessionToken) -> Result<ClientDirectory> {
        let url = self.endpoint("appGet.cgi")?;
        let referer = self.endpoint("index.asp")?;

        let mut response = self
            .agent
            .get(url.as_str())
            .query("hook", "get_clientlist()")
            .header("Accept", "application/json, text/javascript, */*; q=0.01")
            .header("Cookie", token.cookie_header().as_str())
            .header("Referer", referer.as_str())
            .header("X-Requested-With", "XMLHttpRequest")
            .call()
            .inspect_err(|e| error!("Client list request failed: {}", e))
            .context("Failed to send client list request")?;

        let body: ClientListResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse client list response")?;

        Ok(client_directory(body))
    }

    fn history_page(&self, token: &SessionToken, page: u32) -> Result<String> {
        let url = self.endpoint("getWebHistory.asp")?;
        let referer = self.endpoint("AdaptiveQoS_WebHistory.asp")?;
        // Cache buster, as sent by the admin page's jQuery call
        let nonce = Utc::now().timestamp_millis().to_string();

        debug!("Fetching history page {}", page);

        let mut response = self
            .agent
            .get(url.as_str())
            .query("client", "all")
            .query("page", page.to_string())
            .query("_", nonce)
            .header(
                "Accept",
                "text/javascript, application/javascript, application/ecmascript, */*; q=0.01",
            )
            .header("Cookie", token.cookie_header().as_str())
            .header("Referer", referer.as_str())
            .header("X-Requested-With", "XMLHttpRequest")
            .call()
            .inspect_err(|e| error!("History page {} request failed: {}", page, e))
            .with_context(|| format!("Failed to send history request for page {}", page))?;

        response
            .body_mut()
            .read_to_string()
            .with_context(|| format!("Failed to read history page {}", page))
    }
}

/// Parse a base URL and make sure relative endpoints resolve beneath it
fn normalize_base_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url.trim())
        .with_context(|| format!("Invalid router base URL: {}", base_url))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Build a directory from the `get_clientlist()` response
///
/// Members that are not device objects (`maclist`, `ClientAPILevel`, ...) are
/// skipped, as are device objects that don't deserialize.
pub fn client_directory(response: ClientListResponse) -> ClientDirectory {
    let mut directory = ClientDirectory::new();
    for (mac, value) in response.get_clientlist {
        if !value.is_object() {
            continue;
        }
        match serde_json::from_value::<ClientEntry>(value) {
            Ok(entry) => directory.insert(mac, entry),
            Err(e) => warn!("Skipping client {}: {}", mac, e),
        }
    }

    debug!("Client list has {} entries", directory.len());
    directory
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url_adds_slash() {
        let url = normalize_base_url("http://192.168.1.1").unwrap();
        assert_eq!(url.as_str(), "http://192.168.1.1/");

        let url = normalize_base_url("http://router.asus.com/admin").unwrap();
        assert_eq!(
            url.join("login.cgi").unwrap().as_str(),
            "http://router.asus.com/admin/login.cgi"
        );
    }

    #[test]
    fn test_normalize_base_url_invalid() {
        assert!(normalize_base_url("not a url").is_err());
    }

    fn parse_client_list(body: &str) -> serde_json::Result<ClientDirectory> {
        serde_json::from_str(body).map(client_directory)
    }

    #[test]
    fn test_client_directory() {
        let body = r#"{
            "get_clientlist": {
                "AA:BB:CC:DD:EE:FF": {
                    "name": "android-abc", "nickName": "Phone", "ip": "192.168.1.20", "isOnline": "1"
                },
                "11:22:33:44:55:66": {"name": "LivingRoomTV", "nickName": "", "ip": "192.168.1.30"},
                "maclist": ["AA:BB:CC:DD:EE:FF", "11:22:33:44:55:66"],
                "ClientAPILevel": "2"
            }
        }"#;

        let dir = parse_client_list(body).unwrap();
        assert_eq!(dir.len(), 2);
        let phone = dir.lookup("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(phone.nickname, "Phone");
        assert_eq!(phone.ip, "192.168.1.20");
        assert!(dir.lookup("maclist").is_none());
    }

    #[test]
    fn test_client_directory_skips_bad_entries() {
        let body = r#"{"get_clientlist": {"AA:BB:CC:DD:EE:FF": {"name": 5}}}"#;
        let dir = parse_client_list(body).unwrap();
        assert!(dir.is_empty());
    }

    #[test]
    fn test_client_list_rejects_html() {
        assert!(parse_client_list("<html>login</html>").is_err());
    }
}
