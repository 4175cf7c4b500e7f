//! Minimal threaded HTTP/1.1 server for integration tests.
//!
//! Serves one static body. HEAD answers with Content-Length; GET honors
//! `Range: bytes=a-b` with 206 Partial Content. Every request is logged and a
//! few faults can be switched on per server.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 (servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and returns 200 with the full body.
    pub support_ranges: bool,
    /// Any GET whose range covers this offset is answered with this status.
    pub fail_at: Option<(u64, u16)>,
    /// The first N GETs send only half of their body, then close.
    pub close_early: usize,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            fail_at: None,
            close_early: 0,
        }
    }
}

/// One logged request: method and the requested range, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedRequest {
    pub method: String,
    pub range: Option<(u64, u64)>,
}

pub struct RangeServer {
    /// URL of the served file, e.g. `http://127.0.0.1:12345/file.bin`.
    pub url: String,
    log: Arc<Mutex<Vec<LoggedRequest>>>,
}

impl RangeServer {
    pub fn requests(&self) -> Vec<LoggedRequest> {
        self.log.lock().unwrap().clone()
    }

    /// Ranges of all GETs, sorted by start offset.
    pub fn get_ranges(&self) -> Vec<(u64, u64)> {
        let mut ranges: Vec<(u64, u64)> = self
            .requests()
            .into_iter()
            .filter(|r| r.method == "GET")
            .filter_map(|r| r.range)
            .collect();
        ranges.sort_unstable();
        ranges
    }

    pub fn get_count(&self) -> usize {
        self.requests().iter().filter(|r| r.method == "GET").count()
    }
}

pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

/// Serve `body` from a background thread until the process exits.
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let log = Arc::new(Mutex::new(Vec::new()));
    let early_left = Arc::new(AtomicUsize::new(opts.close_early));
    let server_log = Arc::clone(&log);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let log = Arc::clone(&server_log);
            let early_left = Arc::clone(&early_left);
            thread::spawn(move || handle(stream, &body, opts, &log, &early_left));
        }
    });
    RangeServer {
        url: format!("http://127.0.0.1:{}/file.bin", port),
        log,
    }
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while !data.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return None,
            Ok(n) => data.extend_from_slice(&buf[..n]),
        }
        if data.len() > 64 * 1024 {
            return None;
        }
    }
    String::from_utf8(data).ok()
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    opts: RangeServerOptions,
    log: &Mutex<Vec<LoggedRequest>>,
    early_left: &AtomicUsize,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let request = match read_head(&mut stream) {
        Some(r) => r,
        None => return,
    };
    let (method, range) = parse_request(&request);
    log.lock().unwrap().push(LoggedRequest {
        method: method.clone(),
        range,
    });
    let total = body.len() as u64;

    match method.as_str() {
        "HEAD" if opts.head_allowed => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n",
                total
            );
            let _ = stream.write_all(head.as_bytes());
        }
        "GET" => {
            if let (Some((offset, status)), Some((start, end))) = (opts.fail_at, range) {
                if start <= offset && offset <= end {
                    send_status(&mut stream, status);
                    return;
                }
            }
            let (status, content_range, slice) = match range {
                Some((start, end)) if opts.support_ranges => {
                    let end = end.min(total.saturating_sub(1));
                    if start >= total || start > end {
                        send_status(&mut stream, 416);
                        return;
                    }
                    (
                        "206 Partial Content",
                        Some(format!("bytes {}-{}/{}", start, end, total)),
                        &body[start as usize..=end as usize],
                    )
                }
                _ => ("200 OK", None, body),
            };
            let content_range = content_range
                .map(|v| format!("Content-Range: {}\r\n", v))
                .unwrap_or_default();
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
                status,
                slice.len(),
                content_range
            );
            let _ = stream.write_all(head.as_bytes());
            let cut = early_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if cut {
                let _ = stream.write_all(&slice[..slice.len() / 2]);
                let _ = stream.flush();
                return;
            }
            let _ = stream.write_all(slice);
        }
        _ => send_status(&mut stream, 405),
    }
}

fn send_status(stream: &mut TcpStream, status: u16) {
    let reason = match status {
        404 => "Not Found",
        405 => "Method Not Allowed",
        416 => "Range Not Satisfiable",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status, reason
    );
    let _ = stream.write_all(response.as_bytes());
}

/// Method and the `(start, end_inclusive)` of a `Range: bytes=a-b` header.
fn parse_request(request: &str) -> (String, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("")
        .to_ascii_uppercase();
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("range") {
            continue;
        }
        if let Some((a, b)) = value.trim().strip_prefix("bytes=").and_then(|v| v.split_once('-')) {
            let start = a.trim().parse::<u64>().unwrap_or(0);
            let end = b.trim().parse::<u64>().unwrap_or(u64::MAX);
            range = Some((start, end));
        }
    }
    (method, range)
}
