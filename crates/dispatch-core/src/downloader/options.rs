//! libcurl transfer options shared by probes and segment requests.

use std::collections::HashMap;
use std::time::Duration;

use curl::easy::{Easy2, Handler, List};

/// Timeouts and limits applied to every easy handle a job creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Total time allowed for one request, body included.
    pub timeout: Duration,
    /// Abort when throughput stays below this many bytes/s for `low_speed_time`. 0 disables.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    pub max_redirections: u32,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(600),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            max_redirections: 10,
        }
    }
}

impl CurlOptions {
    /// Probes transfer at most one byte of body; keep them short.
    pub fn for_probe(&self) -> Self {
        Self {
            timeout: self.timeout.min(Duration::from_secs(30)),
            ..*self
        }
    }

    pub fn apply<H: Handler>(&self, easy: &mut Easy2<H>) -> Result<(), curl::Error> {
        easy.follow_location(true)?;
        easy.max_redirections(self.max_redirections)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.timeout(self.timeout)?;
        if self.low_speed_limit > 0 {
            easy.low_speed_limit(self.low_speed_limit)?;
            easy.low_speed_time(self.low_speed_time)?;
        }
        Ok(())
    }
}

/// Install `Name: value` request headers. An empty map leaves curl's defaults.
pub(crate) fn set_custom_headers<H: Handler>(
    easy: &mut Easy2<H>,
    headers: &HashMap<String, String>,
) -> Result<(), curl::Error> {
    if headers.is_empty() {
        return Ok(());
    }
    let mut list = List::new();
    for (k, v) in headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    easy.http_headers(list)
}
