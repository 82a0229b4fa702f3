//! Range math and segment planning.
//!
//! Splits `[0, total)` into contiguous half-open segments and renders the
//! HTTP Range bounds for each.

mod range;

pub use range::{plan_segments, Segment};
