//! Resource probing before a segmented download.
//!
//! Issues a HEAD request through libcurl to learn `Content-Length`,
//! `Accept-Ranges: bytes`, ETag and Last-Modified. Servers that reject HEAD or
//! do not advertise range support get a second look with a one-byte range GET
//! (`Range: bytes=0-0`); a `206` with `Content-Range` proves ranges work and
//! carries the total length.

mod parse;

pub(crate) use parse::{parse_content_range, parse_http_status};

use std::collections::HashMap;
use std::str;

use crate::downloader::{set_custom_headers, CurlOptions};

/// What the probe learned about the resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResult {
    /// Total size in bytes, if known.
    pub content_length: Option<u64>,
    /// Byte ranges are supported.
    pub accept_ranges: bool,
    /// `ETag` value if present (used for resume validation).
    pub etag: Option<String>,
    /// `Last-Modified` value if present (used for resume validation).
    pub last_modified: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("curl: {0}")]
    Curl(#[from] curl::Error),
    #[error("HTTP {0}")]
    Http(u32),
    #[error("server did not report a content length")]
    UnknownLength,
}

/// Collects header lines; drops the body of the range probe after the first chunk.
#[derive(Default)]
struct ProbeHandler {
    headers: Vec<String>,
    body_refused: bool,
}

impl curl::easy::Handler for ProbeHandler {
    fn header(&mut self, data: &[u8]) -> bool {
        if let Ok(s) = str::from_utf8(data) {
            let line = s.trim_end();
            // New status line (after a redirect): start over.
            if line.starts_with("HTTP/") {
                self.headers.clear();
            }
            if !line.is_empty() {
                self.headers.push(line.to_string());
            }
        }
        true
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, curl::easy::WriteError> {
        // A server ignoring the range would stream the whole body.
        if data.len() > 1 {
            self.body_refused = true;
            return Ok(0);
        }
        Ok(data.len())
    }
}

fn new_easy(
    url: &str,
    custom_headers: &HashMap<String, String>,
    opts: &CurlOptions,
) -> Result<curl::easy::Easy2<ProbeHandler>, curl::Error> {
    let mut easy = curl::easy::Easy2::new(ProbeHandler::default());
    easy.url(url)?;
    opts.apply(&mut easy)?;
    set_custom_headers(&mut easy, custom_headers)?;
    Ok(easy)
}

fn head(
    url: &str,
    custom_headers: &HashMap<String, String>,
    opts: &CurlOptions,
) -> Result<ProbeResult, ProbeError> {
    let mut easy = new_easy(url, custom_headers, opts)?;
    easy.nobody(true)?;
    easy.perform()?;
    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(ProbeError::Http(code));
    }
    Ok(parse::parse_headers(&easy.get_ref().headers))
}

fn range_probe(
    url: &str,
    custom_headers: &HashMap<String, String>,
    opts: &CurlOptions,
) -> Result<ProbeResult, ProbeError> {
    let mut easy = new_easy(url, custom_headers, opts)?;
    easy.range("0-0")?;
    if let Err(e) = easy.perform() {
        if !(e.is_write_error() && easy.get_ref().body_refused) {
            return Err(e.into());
        }
    }
    let code = easy.response_code()?;
    let lines = &easy.get_ref().headers;
    let mut result = parse::parse_headers(lines);
    match code {
        206 => {
            result.accept_ranges = true;
            result.content_length = parse_content_range(lines).and_then(|(_, _, total)| total);
        }
        200..=299 => result.accept_ranges = false,
        _ => return Err(ProbeError::Http(code)),
    }
    Ok(result)
}

/// Probe `url` for length and range support. Blocking; run it from
/// `spawn_blocking` when called from async code.
pub fn probe(
    url: &str,
    custom_headers: &HashMap<String, String>,
    opts: &CurlOptions,
) -> Result<ProbeResult, ProbeError> {
    let head_result = head(url, custom_headers, opts);
    if let Ok(ref h) = head_result {
        if h.accept_ranges && h.content_length.is_some() {
            return Ok(h.clone());
        }
    }
    tracing::debug!(url, head = ?head_result, "HEAD inconclusive, trying range probe");

    let result = match (head_result, range_probe(url, custom_headers, opts)) {
        (Ok(h), Ok(r)) => ProbeResult {
            content_length: r.content_length.or(h.content_length),
            accept_ranges: r.accept_ranges,
            etag: r.etag.or(h.etag),
            last_modified: r.last_modified.or(h.last_modified),
        },
        (Ok(h), Err(e)) => {
            tracing::debug!(url, error = %e, "range probe failed, using HEAD result");
            h
        }
        (Err(_), Ok(r)) => r,
        (Err(head_err), Err(range_err)) => {
            tracing::debug!(url, %range_err, "range probe failed after HEAD failure");
            return Err(head_err);
        }
    };

    if result.content_length.is_none() {
        return Err(ProbeError::UnknownLength);
    }
    Ok(result)
}
