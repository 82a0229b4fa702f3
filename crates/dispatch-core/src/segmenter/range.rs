//! Segment type and range planning.

/// A single segment: byte range [start, end) (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
}

impl Segment {
    /// Length of this segment in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Range in the form libcurl's `CURLOPT_RANGE` expects: `start-(end-1)`.
    pub fn curl_range(&self) -> String {
        if self.is_empty() {
            "0-0".to_string()
        } else {
            format!("{}-{}", self.start, self.end - 1)
        }
    }
}

/// Splits `[0, total_size)` into `segment_count` contiguous segments.
///
/// Every segment gets `total_size / n` bytes and the remainder is folded into
/// the last one, so sizes always sum to `total_size`. The count is clamped to
/// `1..=total_size` so no segment is empty; a zero-length resource yields a
/// single empty segment.
pub fn plan_segments(total_size: u64, segment_count: usize) -> Vec<Segment> {
    if total_size == 0 {
        return vec![Segment { start: 0, end: 0 }];
    }

    let n = (segment_count.max(1) as u64).min(total_size);
    let base = total_size / n;

    let mut out = Vec::with_capacity(n as usize);
    let mut offset = 0u64;
    for i in 0..n {
        let end = if i + 1 == n { total_size } else { offset + base };
        out.push(Segment { start: offset, end });
        offset = end;
    }
    out
}
