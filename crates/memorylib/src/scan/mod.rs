//! Signature scanning over a cached memory dump
//!
//! A [`SignatureScanner`] dumps its [`ScanTarget`] once, on the first search,
//! and answers every later search from that snapshot until
//! [`SignatureScanner::reset_region`] is called.

mod pattern;
mod region;
mod scanner;
mod target;

pub use pattern::{MASK_REQUIRED, MASK_WILDCARD, Pattern, PatternError};
pub use region::{DumpError, DumpedRegion};
pub use scanner::{FindOptions, ScanState, SignatureScanner};
pub use target::{ScanStream, ScanTarget};
