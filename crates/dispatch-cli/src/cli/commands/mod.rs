//! CLI command handlers, one per file.

mod checksum;
mod fetch;
mod limit_probe;
mod pick;

pub use checksum::run_checksum;
pub use fetch::{run_fetch, FetchArgs};
pub use limit_probe::run_limit_probe;
pub use pick::run_pick;
