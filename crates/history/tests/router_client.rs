//! RouterClient tests against a loopback fake router
//!
//! A small HTTP/1.1 server on 127.0.0.1 answers the three admin endpoints and
//! records every request it receives.

use chrono::{TimeZone, Utc};
use history::router::DEFAULT_DATE_FORMAT;
use history::{DisplayZone, RouterApi, RouterClient, SessionToken, SyncOptions, sync_history};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::TempDir;

const CLIENT_LIST: &str = r#"{"get_clientlist":{"AA:BB:CC:DD:EE:FF":{"name":"android-1","nickName":"Phone","ip":"192.168.1.20"},"maclist":["AA:BB:CC:DD:EE:FF"]}}"#;

#[derive(Clone, Copy)]
struct Behaviour {
    set_cookie: bool,
    history_status: u16,
}

struct FakeRouter {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeRouter {
    fn start(behaviour: Behaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let _ = handle(stream, behaviour, &recorded);
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{}/", port),
            requests,
        }
    }

    /// Recorded requests, lowercased for header-name-insensitive matching
    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn handle(
    stream: TcpStream,
    behaviour: Behaviour,
    recorded: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    let mut head = String::new();
    let mut content_length = 0usize;
    let mut chunked = false;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
        if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
            chunked = true;
        }
        let end = line == "\r\n";
        head.push_str(&line);
        if end {
            break;
        }
    }

    let body = if chunked {
        read_chunked(&mut reader)?
    } else {
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body)?;
        body
    };

    let request = format!("{}{}", head, String::from_utf8_lossy(&body)).to_ascii_lowercase();
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    recorded.lock().unwrap().push(request);

    let (status, extra_headers, body) = if path.starts_with("/login.cgi") {
        let cookie = if behaviour.set_cookie {
            "Set-Cookie: asus_token=tok123; HttpOnly;\r\n"
        } else {
            ""
        };
        (200, cookie.to_string(), "<html></html>".to_string())
    } else if path.starts_with("/appGet.cgi") {
        (200, String::new(), CLIENT_LIST.to_string())
    } else if path.starts_with("/getWebHistory.asp") {
        let body = if path.contains("page=1&") {
            r#"array_temp = [["AA:BB:CC:DD:EE:FF","1670000000","example.com"]];"#
        } else {
            "array_temp = [];"
        };
        (behaviour.history_status, String::new(), body.to_string())
    } else {
        (404, String::new(), String::new())
    };

    let reason = if status == 200 { "OK" } else { "Error" };
    write!(
        writer,
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
        status,
        reason,
        body.len(),
        extra_headers,
        body
    )?;
    writer.flush()
}

fn read_chunked(reader: &mut impl BufRead) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader.read_line(&mut size_line)?;
        let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
        let mut chunk = vec![0u8; size + 2];
        reader.read_exact(&mut chunk)?;
        if size == 0 {
            return Ok(body);
        }
        body.extend_from_slice(&chunk[..size]);
    }
}

fn ok_router() -> FakeRouter {
    FakeRouter::start(Behaviour {
        set_cookie: true,
        history_status: 200,
    })
}

#[test]
fn test_login_extracts_token_and_posts_form() {
    let router = ok_router();
    let client = RouterClient::new(&router.base_url).unwrap();

    let token = client.login("admin", "secret").unwrap();
    assert_eq!(token.as_str(), "tok123");

    let requests = router.requests();
    assert_eq!(requests.len(), 1);
    let login = &requests[0];
    assert!(login.starts_with("post /login.cgi"));
    // base64("admin:secret"), lowercased by the recorder
    assert!(login.contains("login_authorization=ywrtaw46c2vjcmv0"));
    assert!(login.contains("current_page=main_login.asp"));
    assert!(login.contains("action_wait=5"));
}

#[test]
fn test_login_without_cookie_fails() {
    let router = FakeRouter::start(Behaviour {
        set_cookie: false,
        history_status: 200,
    });
    let client = RouterClient::new(&router.base_url).unwrap();

    assert!(client.login("admin", "secret").is_err());
}

#[test]
fn test_client_list_sends_cookie() {
    let router = ok_router();
    let client = RouterClient::new(&router.base_url).unwrap();

    let directory = client.client_list(&SessionToken::new("tok123")).unwrap();
    assert_eq!(directory.len(), 1);
    assert_eq!(directory.lookup("AA:BB:CC:DD:EE:FF").unwrap().nickname, "Phone");

    let requests = router.requests();
    assert!(requests[0].starts_with("get /appget.cgi?hook="));
    assert!(requests[0].contains("cookie: asus_token=tok123"));
}

#[test]
fn test_history_page_query() {
    let router = ok_router();
    let client = RouterClient::new(&router.base_url).unwrap();

    let payload = client.history_page(&SessionToken::new("tok123"), 1).unwrap();
    assert!(payload.starts_with("array_temp = [["));

    let requests = router.requests();
    assert!(requests[0].starts_with("get /getwebhistory.asp?client=all&page=1&_="));
    assert!(requests[0].contains("cookie: asus_token=tok123"));
    assert!(requests[0].contains("x-requested-with: xmlhttprequest"));
}

#[test]
fn test_history_page_http_error() {
    let router = FakeRouter::start(Behaviour {
        set_cookie: true,
        history_status: 500,
    });
    let client = RouterClient::new(&router.base_url).unwrap();

    assert!(client.history_page(&SessionToken::new("tok123"), 1).is_err());
}

#[test]
fn test_full_sync_over_http() {
    let router = ok_router();
    let client = RouterClient::new(&router.base_url).unwrap();
    let dir = TempDir::new().unwrap();

    let options = SyncOptions {
        username: "admin".to_string(),
        password: "secret".to_string(),
        max_pages: 5,
        from: Some(Utc.timestamp_opt(1_669_000_000, 0).unwrap()),
        delimiter: ";".to_string(),
        output_folder: dir.path().to_path_buf(),
        started_at: Utc.timestamp_opt(1_670_050_000, 0).unwrap(),
        zone: DisplayZone::Utc,
        date_format: DEFAULT_DATE_FORMAT.to_string(),
        echo: false,
    };

    let stats = sync_history(&client, options).unwrap();
    assert_eq!(stats.pages_fetched, 2);
    assert_eq!(stats.rows_written, 1);

    let content = std::fs::read_to_string(stats.output_path.unwrap()).unwrap();
    assert!(content.contains(
        ";AA:BB:CC:DD:EE:FF;Phone;192.168.1.20;1670000000;2022-12-02 16:53:20;example.com\n"
    ));
}
