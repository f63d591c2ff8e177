//! # memorylib
//!
//! External-process memory inspection.
//!
//! This crate provides:
//! - Process memory access through a pluggable [`MemoryTransport`]
//! - Pointer-chain resolution with configurable pointer width
//! - Signature scanning over a cached dump of a process region or a stream
//!
//! The only OS-facing code lives behind [`MemoryTransport`]. On Windows,
//! [`WindowsTransport`] implements it with `ReadProcessMemory` and friends;
//! [`MockTransport`] backs the tests on every platform.

pub mod config;
pub mod error;
pub mod memory;
pub mod scan;

pub use config::{AccessConfig, AccessConfigBuilder};
pub use error::{Error, Result};
pub use memory::{
    ChainWrite, EmptyChain, MemoryAccess, MemoryTransport, PointerWidth, Protection, RawHandle,
    ReadMemory, ReadOutcome, TargetHandle,
};
pub use scan::{
    DumpError, DumpedRegion, FindOptions, Pattern, PatternError, ScanState, ScanStream,
    ScanTarget, SignatureScanner,
};

#[cfg(target_os = "windows")]
pub use memory::WindowsTransport;

#[doc(hidden)]
pub use memory::{MockOpenFailure, MockTransport, MockTransportBuilder};
