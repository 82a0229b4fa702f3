//! Map segment failures onto retry kinds.

use super::policy::ErrorKind;
use crate::downloader::SegmentError;

pub fn classify(err: &SegmentError) -> ErrorKind {
    match err {
        SegmentError::Curl(e) => classify_curl_error(e),
        SegmentError::Http(code) => classify_http_status(*code),
        SegmentError::TimedOut => ErrorKind::Timeout,
        SegmentError::PartialTransfer { .. } => ErrorKind::Connection,
        // A server answering ranges wrongly will keep doing so; local disk errors too.
        SegmentError::InvalidRangeResponse { .. }
        | SegmentError::WriteFailed(_)
        | SegmentError::Spawn(_)
        | SegmentError::Cancelled => ErrorKind::Other,
    }
}

pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        ErrorKind::Timeout
    } else if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_send_error()
        || e.is_recv_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        ErrorKind::Connection
    } else {
        ErrorKind::Other
    }
}

pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}
