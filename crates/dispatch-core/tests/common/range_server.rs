//! Minimal HTTP/1.1 server for integration tests: HEAD, Range GET, and a few
//! misbehaviours (blocked HEAD, no ranges, a failing range, slow responses).
//!
//! Behaviour can be changed while the server runs, e.g. to "fix" a failing
//! range before resuming.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 (simulates servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// If false, omit `Accept-Ranges: bytes` even if ranges work.
    pub advertise_ranges: bool,
    /// Ranged GETs starting at this offset get `500`.
    pub fail_range_start: Option<u64>,
    /// How many times the failing range fails; `None` = always.
    pub fail_times: Option<u32>,
    /// Sleep before answering any GET. The failing range still answers at once.
    pub get_delay: Option<Duration>,
    pub etag: Option<&'static str>,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            advertise_ranges: true,
            fail_range_start: None,
            fail_times: None,
            get_delay: None,
            etag: Some("v1"),
        }
    }
}

#[derive(Default)]
struct Shared {
    opts: Mutex<RangeServerOptions>,
    /// `(start, end_inclusive)` of every ranged GET served.
    ranged_gets: Mutex<Vec<(u64, u64)>>,
}

pub struct RangeServer {
    pub url: String,
    shared: Arc<Shared>,
}

impl RangeServer {
    pub fn update(&self, f: impl FnOnce(&mut RangeServerOptions)) {
        f(&mut self.shared.opts.lock().unwrap());
    }

    /// Ranged GETs seen so far (probe requests included), sorted.
    pub fn ranged_gets(&self) -> Vec<(u64, u64)> {
        let mut v = self.shared.ranged_gets.lock().unwrap().clone();
        v.sort_unstable();
        v
    }

    pub fn clear_log(&self) {
        self.shared.ranged_gets.lock().unwrap().clear();
    }
}

pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

/// Serves `body` from a background thread until the process exits.
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let shared = Arc::new(Shared {
        opts: Mutex::new(opts),
        ranged_gets: Mutex::new(Vec::new()),
    });
    let server_shared = Arc::clone(&shared);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let shared = Arc::clone(&server_shared);
            thread::spawn(move || handle(stream, &body, &shared));
        }
    });
    RangeServer {
        url: format!("http://127.0.0.1:{}/payload.bin", port),
        shared,
    }
}

/// A URL nothing listens on.
pub fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/gone.bin", port)
}

fn handle(mut stream: TcpStream, body: &[u8], shared: &Shared) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, range) = parse_request(request);
    let total = body.len() as u64;
    let opts = *shared.opts.lock().unwrap();

    let mut extra = String::new();
    if opts.advertise_ranges && opts.support_ranges {
        extra.push_str("Accept-Ranges: bytes\r\n");
    }
    if let Some(etag) = opts.etag {
        extra.push_str(&format!("ETag: \"{}\"\r\n", etag));
    }

    if method.eq_ignore_ascii_case("HEAD") {
        if !opts.head_allowed {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            return;
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
            total, extra
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }

    let range = range.filter(|_| opts.support_ranges);
    if let Some((start, end_incl)) = range {
        shared.ranged_gets.lock().unwrap().push((start, end_incl));
        if should_fail(shared, start) {
            let _ = stream.write_all(
                b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\nboom",
            );
            return;
        }
    }

    if let Some(delay) = opts.get_delay {
        thread::sleep(delay);
    }

    let (status, content_range, slice) = match range {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start >= total || start > end_incl {
                ("416 Range Not Satisfiable", format!("Content-Range: bytes */{}\r\n", total), &body[0..0])
            } else {
                let slice = &body[start as usize..=end_incl as usize];
                (
                    "206 Partial Content",
                    format!("Content-Range: bytes {}-{}/{}\r\n", start, end_incl, total),
                    slice,
                )
            }
        }
        None => ("200 OK", String::new(), body),
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}{}Connection: close\r\n\r\n",
        status,
        slice.len(),
        content_range,
        extra
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}

fn should_fail(shared: &Shared, start: u64) -> bool {
    let mut opts = shared.opts.lock().unwrap();
    if opts.fail_range_start != Some(start) {
        return false;
    }
    match opts.fail_times {
        None => true,
        Some(0) => false,
        Some(n) => {
            opts.fail_times = Some(n - 1);
            true
        }
    }
}

/// Returns (method, optional (start, end_inclusive) for `Range: bytes=X-Y`).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");
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
        let value = value.trim();
        if let Some(bounds) = value.strip_prefix("bytes=") {
            if let Some((a, b)) = bounds.split_once('-') {
                let start = a.trim().parse::<u64>().unwrap_or(0);
                let end = b.trim();
                let end_incl = if end.is_empty() {
                    u64::MAX
                } else {
                    end.parse::<u64>().unwrap_or(0)
                };
                range = Some((start, end_incl));
            }
        }
    }
    (method, range)
}
