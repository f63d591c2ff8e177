use thiserror::Error;

/// Why a dump did not produce a region
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("base address is null")]
    NullBaseAddress,

    #[error("target process has exited")]
    ProcessExited,

    #[error("region size is zero")]
    ZeroSize,

    #[error("cannot allocate {size} bytes for the region")]
    Allocation { size: usize },

    #[error("short read: {read} of {requested} bytes")]
    ShortRead { requested: usize, read: usize },

    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),
}

/// Point-in-time snapshot of `bytes.len()` bytes starting at `base`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpedRegion {
    base: u64,
    bytes: Vec<u8>,
}

impl DumpedRegion {
    pub fn new(base: u64, bytes: Vec<u8>) -> Self {
        Self { base, bytes }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Absolute address of a position inside the region
    pub fn address_of(&self, position: usize) -> u64 {
        self.base.wrapping_add(position as u64)
    }

    /// Region-relative position of an absolute address
    pub fn position_of(&self, address: u64) -> Option<usize> {
        address
            .checked_sub(self.base)
            .and_then(|offset| usize::try_from(offset).ok())
    }
}
