//! Router session login
//!
//! The admin UI logs in by posting a form to `login.cgi` with
//! `base64(username:password)` as the authorization value. The router answers
//! with an `asus_token` session cookie which authenticates later requests.

use anyhow::{Context, Result};
use base64::prelude::*;
use log::{debug, error};
use std::collections::HashMap;
use ureq::Agent;
use url::Url;

use crate::models::SessionToken;

/// Name of the session cookie set by `login.cgi`
const TOKEN_COOKIE: &str = "asus_token";

/// Build the form fields posted to `login.cgi`
///
/// Besides the authorization value the endpoint expects the same fixed
/// fields the admin page sends.
pub fn login_form(username: &str, password: &str) -> Vec<(&'static str, String)> {
    let authorization = BASE64_STANDARD.encode(format!("{}:{}", username, password));
    vec![
        ("group_id", String::new()),
        ("action_mode", String::new()),
        ("action_script", String::new()),
        ("action_wait", "5".to_string()),
        ("current_page", "Main_Login.asp".to_string()),
        ("next_page", "index.asp".to_string()),
        ("login_authorization", authorization),
        ("login_captcha", String::new()),
    ]
}

/// Parse a cookie string (`Set-Cookie` or `Cookie` header) into name/value pairs
///
/// Attributes without a value, such as `HttpOnly` or `Secure`, map to `None`.
/// Names and values are percent-decoded; undecodable input is kept verbatim.
pub fn parse_cookie(header: &str) -> HashMap<String, Option<String>> {
    header
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((name, value)) => (decode(name.trim()), Some(decode(value.trim()))),
            None => (decode(part), None),
        })
        .collect()
}

fn decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// Find a non-empty session token among `Set-Cookie` header values
pub fn token_from_set_cookie<'a>(
    headers: impl IntoIterator<Item = &'a str>,
) -> Option<SessionToken> {
    headers.into_iter().find_map(|header| {
        parse_cookie(header)
            .remove(TOKEN_COOKIE)
            .flatten()
            .filter(|token| !token.is_empty())
            .map(SessionToken::new)
    })
}

/// Log in and return the session token
///
/// Single attempt. Transport errors and responses without an `asus_token`
/// cookie are logged and returned as errors.
pub(crate) fn login(
    agent: &Agent,
    base: &Url,
    username: &str,
    password: &str,
) -> Result<SessionToken> {
    let url = base.join("login.cgi").context("Invalid login URL")?;
    let referer = base.join("Main_Login.asp").context("Invalid referer URL")?;
    let origin = base.origin().ascii_serialization();

    debug!("Logging in to {} as {}", url, username);

    let response = agent
        .post(url.as_str())
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .header("Cache-Control", "max-age=0")
        .header("Origin", origin.as_str())
        .header("Referer", referer.as_str())
        .header("Upgrade-Insecure-Requests", "1")
        .send_form(login_form(username, password))
        .inspect_err(|e| error!("Login request failed: {}", e))
        .context("Failed to send login request")?;

    let cookies: Vec<&str> = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    match token_from_set_cookie(cookies) {
        Some(token) => Ok(token),
        None => {
            error!("Login response did not set an {} cookie", TOKEN_COOKIE);
            anyhow::bail!("Login response did not set an {} cookie", TOKEN_COOKIE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_form_authorization() {
        let form = login_form("admin", "secret");
        let auth = form
            .iter()
            .find(|(k, _)| *k == "login_authorization")
            .map(|(_, v)| v.as_str());
        // base64("admin:secret")
        assert_eq!(auth, Some("YWRtaW46c2VjcmV0"));
    }

    #[test]
    fn test_login_form_fixed_fields() {
        let form: HashMap<_, _> = login_form("u", "p").into_iter().collect();
        assert_eq!(form["action_wait"], "5");
        assert_eq!(form["current_page"], "Main_Login.asp");
        assert_eq!(form["next_page"], "index.asp");
        assert_eq!(form["login_captcha"], "");
        assert_eq!(form.len(), 8);
    }

    #[test]
    fn test_parse_cookie_with_valueless_attributes() {
        let cookies = parse_cookie("asus_token=abc123; HttpOnly; Path=/");
        assert_eq!(cookies["asus_token"], Some("abc123".to_string()));
        assert_eq!(cookies["HttpOnly"], None);
        assert_eq!(cookies["Path"], Some("/".to_string()));
    }

    #[test]
    fn test_parse_cookie_decodes() {
        let cookies = parse_cookie("na%20me=va%3Dlue");
        assert_eq!(cookies["na me"], Some("va=lue".to_string()));
    }

    #[test]
    fn test_parse_cookie_empty() {
        assert!(parse_cookie("").is_empty());
        assert!(parse_cookie(" ; ").is_empty());
    }

    #[test]
    fn test_token_from_set_cookie() {
        let headers = ["clickedItem_tab=0", "asus_token=tok; HttpOnly;"];
        let token = token_from_set_cookie(headers).unwrap();
        assert_eq!(token.as_str(), "tok");
    }

    #[test]
    fn test_token_from_set_cookie_missing_or_empty() {
        assert!(token_from_set_cookie(["other=1"]).is_none());
        assert!(token_from_set_cookie(["asus_token=; HttpOnly"]).is_none());
        assert!(token_from_set_cookie(["asus_token"]).is_none());
        assert!(token_from_set_cookie(Vec::<&str>::new()).is_none());
    }
}
