//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves a fixed set of routes: static bodies (optionally honouring
//! `Range: bytes=N-` with 206), bodies without `Content-Length`, bodies that
//! stall halfway, redirects and bare status codes. Every request line and its
//! headers are recorded for assertions.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const EMPTY: &[u8] = &[];

#[derive(Debug, Clone)]
pub enum Route {
    Body { data: Vec<u8>, ranges: bool },
    /// 200 with no `Content-Length`; the body ends when the connection closes.
    Unsized(Vec<u8>),
    /// Announces `declared` bytes, sends `sent`, then goes quiet for a minute.
    Stall { sent: Vec<u8>, declared: usize },
    Redirect(String),
    Status(u16),
}

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl Seen {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct TestServer {
    pub base: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    pub fn requests(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn requests_for(&self, path: &str) -> Vec<Seen> {
        self.requests().into_iter().filter(|s| s.path == path).collect()
    }
}

/// Starts a server in a background thread. It runs until the process exits.
pub fn start(routes: Vec<(&str, Route)>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes: Arc<HashMap<String, Route>> = Arc::new(
        routes
            .into_iter()
            .map(|(p, r)| (p.to_string(), r))
            .collect(),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            let log = Arc::clone(&log);
            thread::spawn(move || handle(stream, &routes, &log));
        }
    });
    TestServer {
        base: format!("http://127.0.0.1:{}/", port),
        seen,
    }
}

fn handle(mut stream: TcpStream, routes: &HashMap<String, Route>, log: &Mutex<Vec<Seen>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let seen = parse_request(request);
    log.lock().unwrap().push(seen.clone());

    let range_start = seen
        .header("range")
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.strip_suffix('-'))
        .and_then(|v| v.parse::<usize>().ok());

    let mut sized = true;
    let mut declared = None;
    let (status, extra, body): (&str, String, &[u8]) = match routes.get(&seen.path) {
        None => ("404 Not Found", String::new(), EMPTY),
        Some(Route::Status(code)) => {
            let status = match code {
                403 => "403 Forbidden",
                500 => "500 Internal Server Error",
                _ => "404 Not Found",
            };
            (status, String::new(), EMPTY)
        }
        Some(Route::Unsized(data)) => {
            sized = false;
            ("200 OK", String::new(), &data[..])
        }
        Some(Route::Stall { sent, declared: len }) => {
            declared = Some(*len);
            ("200 OK", String::new(), &sent[..])
        }
        Some(Route::Redirect(location)) => (
            "302 Found",
            format!("Location: {}\r\n", location),
            EMPTY,
        ),
        Some(Route::Body { data, ranges }) => match range_start {
            Some(start) if *ranges && start >= data.len() => (
                "416 Range Not Satisfiable",
                format!("Content-Range: bytes */{}\r\n", data.len()),
                EMPTY,
            ),
            Some(start) if *ranges => (
                "206 Partial Content",
                format!(
                    "Content-Range: bytes {}-{}/{}\r\n",
                    start,
                    data.len() - 1,
                    data.len()
                ),
                &data[start..],
            ),
            _ => ("200 OK", String::new(), &data[..]),
        },
    };

    let length = if sized {
        format!("Content-Length: {}\r\n", declared.unwrap_or(body.len()))
    } else {
        String::new()
    };
    let head = format!(
        "HTTP/1.1 {}\r\n{}{}Connection: close\r\n\r\n",
        status, length, extra
    );
    let _ = stream.write_all(head.as_bytes());
    if seen.method != "HEAD" {
        let _ = stream.write_all(body);
        let _ = stream.flush();
    }
    if declared.is_some() {
        thread::sleep(Duration::from_secs(60));
    }
}

fn parse_request(request: &str) -> Seen {
    let mut lines = request.lines();
    let mut first = lines.next().unwrap_or("").split_whitespace();
    let method = first.next().unwrap_or("").to_string();
    let path = first.next().unwrap_or("/").to_string();
    let mut headers = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    Seen {
        method,
        path,
        headers,
    }
}
