//! One segment transfer: a (ranged) GET streamed straight into the `.part` file.
//!
//! The response is validated once, on the first body chunk: a ranged request
//! must come back `206` with a `Content-Range` naming exactly the requested
//! bytes. Writes are positional at `segment.start + written` and never run past
//! the segment end.

use std::collections::HashMap;
use std::str;
use std::sync::Arc;

use curl::easy::{Easy2, Handler, WriteError};

use super::error::SegmentError;
use super::options::{set_custom_headers, CurlOptions};
use super::progress::SegmentCounter;
use crate::control::CancelToken;
use crate::fetch_head::{parse_content_range, parse_http_status};
use crate::segmenter::Segment;
use crate::storage::PartFile;

/// Everything a segment worker needs; shared by reference across the scoped threads.
pub(super) struct SegmentRequest<'a> {
    pub url: &'a str,
    pub headers: &'a HashMap<String, String>,
    pub opts: &'a CurlOptions,
    pub part: &'a PartFile,
    pub counters: &'a Arc<Vec<SegmentCounter>>,
    pub cancel: &'a CancelToken,
    pub ranged: bool,
}

struct SegmentHandler {
    part: PartFile,
    counters: Arc<Vec<SegmentCounter>>,
    index: usize,
    segment: Segment,
    ranged: bool,
    cancel: CancelToken,
    headers: Vec<String>,
    checked: bool,
    written: u64,
    failure: Option<SegmentError>,
}

impl SegmentHandler {
    fn check_response(&self) -> Result<(), SegmentError> {
        let code = parse_http_status(&self.headers).unwrap_or(0);
        if !(200..300).contains(&code) {
            return Err(SegmentError::Http(code));
        }
        if !self.ranged {
            return Ok(());
        }
        if code != 206 {
            return Err(SegmentError::InvalidRangeResponse {
                detail: format!("expected 206 Partial Content, got {code}"),
            });
        }
        let want = (self.segment.start, self.segment.end - 1);
        match parse_content_range(&self.headers) {
            Some((start, end, _)) if (start, end) == want => Ok(()),
            Some((start, end, _)) => Err(SegmentError::InvalidRangeResponse {
                detail: format!("requested {}-{}, got {start}-{end}", want.0, want.1),
            }),
            None => Err(SegmentError::InvalidRangeResponse {
                detail: "missing Content-Range".to_string(),
            }),
        }
    }

    fn fail(&mut self, err: SegmentError) -> Result<usize, WriteError> {
        self.failure = Some(err);
        // A short count makes curl abort with CURLE_WRITE_ERROR.
        Ok(0)
    }
}

impl Handler for SegmentHandler {
    fn header(&mut self, data: &[u8]) -> bool {
        if let Ok(s) = str::from_utf8(data) {
            let line = s.trim_end();
            if line.starts_with("HTTP/") {
                self.headers.clear();
            }
            if !line.is_empty() {
                self.headers.push(line.to_string());
            }
        }
        true
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        if !self.checked {
            if let Err(e) = self.check_response() {
                return self.fail(e);
            }
            self.checked = true;
        }
        let len = data.len() as u64;
        if self.written + len > self.segment.len() {
            let expected = self.segment.len();
            let received = self.written + len;
            return self.fail(SegmentError::PartialTransfer { expected, received });
        }
        if let Err(e) = self.part.write_at(self.segment.start + self.written, data) {
            return self.fail(SegmentError::WriteFailed(e));
        }
        self.written += len;
        self.counters[self.index].add(len);
        Ok(data.len())
    }

    fn progress(&mut self, _dltotal: f64, _dlnow: f64, _ultotal: f64, _ulnow: f64) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl SegmentRequest<'_> {
    /// One attempt at segment `index`. Resets the segment's counter first so a
    /// retry never double-counts.
    pub(super) fn fetch(&self, index: usize, segment: Segment) -> Result<(), SegmentError> {
        let counter = &self.counters[index];
        counter.reset();
        if self.cancel.is_cancelled() {
            return Err(SegmentError::Cancelled);
        }

        let mut easy = Easy2::new(SegmentHandler {
            part: self.part.clone(),
            counters: Arc::clone(self.counters),
            index,
            segment,
            ranged: self.ranged,
            cancel: self.cancel.clone(),
            headers: Vec::new(),
            checked: false,
            written: 0,
            failure: None,
        });
        self.configure(&mut easy, segment).map_err(SegmentError::Curl)?;

        let outcome = easy.perform();
        if let Some(failure) = easy.get_mut().failure.take() {
            return Err(failure);
        }
        if let Err(e) = outcome {
            if e.is_aborted_by_callback() || self.cancel.is_cancelled() {
                return Err(SegmentError::Cancelled);
            }
            if e.is_operation_timedout() {
                return Err(SegmentError::TimedOut);
            }
            return Err(SegmentError::Curl(e));
        }

        let code = easy.response_code().map_err(SegmentError::Curl)?;
        if !(200..300).contains(&code) {
            return Err(SegmentError::Http(code));
        }
        if self.ranged && code != 206 {
            return Err(SegmentError::InvalidRangeResponse {
                detail: format!("expected 206 Partial Content, got {code}"),
            });
        }
        let received = easy.get_ref().written;
        if received != segment.len() {
            return Err(SegmentError::PartialTransfer {
                expected: segment.len(),
                received,
            });
        }
        counter.mark_done();
        Ok(())
    }

    fn configure(&self, easy: &mut Easy2<SegmentHandler>, segment: Segment) -> Result<(), curl::Error> {
        easy.url(self.url)?;
        self.opts.apply(easy)?;
        set_custom_headers(easy, self.headers)?;
        if self.ranged {
            easy.range(&segment.curl_range())?;
        }
        // Enables the progress callback that polls the cancel token.
        easy.progress(true)?;
        Ok(())
    }
}
