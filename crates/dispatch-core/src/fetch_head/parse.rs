//! Parse HTTP response header lines collected by curl.

use super::ProbeResult;

/// Parse collected header lines into ProbeResult.
pub(crate) fn parse_headers(lines: &[String]) -> ProbeResult {
    let mut content_length = None;
    let mut accept_ranges = false;
    let mut etag = None;
    let mut last_modified = None;

    for line in lines {
        let Some((name, value)) = line.trim().split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            accept_ranges = value.eq_ignore_ascii_case("bytes");
        } else if name.eq_ignore_ascii_case("etag") {
            etag = Some(value.trim_matches('"').to_string());
        } else if name.eq_ignore_ascii_case("last-modified") {
            last_modified = Some(value.to_string());
        }
    }

    ProbeResult {
        content_length,
        accept_ranges,
        etag,
        last_modified,
    }
}

/// Status code from the last `HTTP/` status line.
pub(crate) fn parse_http_status(lines: &[String]) -> Option<u32> {
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("HTTP/"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
}

/// `Content-Range: bytes start-end/total` as `(start, end_inclusive, total)`.
/// `total` is `None` for `*`.
pub(crate) fn parse_content_range(lines: &[String]) -> Option<(u64, u64, Option<u64>)> {
    let value = lines.iter().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-range")
            .then(|| value.trim())
    })?;
    let rest = value.strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((start, end, total))
}
