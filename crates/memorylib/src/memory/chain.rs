//! Pointer-chain resolution
//!
//! A chain `[o0, o1, ..., on]` starting at `base` is walked by reading a
//! pointer at the running address and adding the next offset, once per
//! offset. The caller then performs the terminal read or write at the
//! resolved address.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::trace;

use super::convert::u64_from_le;

/// Width of every intermediate pointer read during a chain walk
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum PointerWidth {
    /// 32-bit targets
    #[default]
    #[strum(to_string = "four", serialize = "4")]
    Four,
    /// 64-bit targets
    #[strum(to_string = "eight", serialize = "8")]
    Eight,
}

impl PointerWidth {
    pub fn bytes(self) -> usize {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
        }
    }

    /// Decode a little-endian pointer of this width
    pub fn decode(self, buffer: &[u8]) -> u64 {
        u64_from_le(&buffer[..buffer.len().min(self.bytes())])
    }

    /// Add a signed offset to a pointer, wrapping at the pointer width
    pub fn apply(self, pointer: u64, offset: i64) -> u64 {
        match self {
            Self::Four => (pointer as u32).wrapping_add(offset as u32) as u64,
            Self::Eight => pointer.wrapping_add_signed(offset),
        }
    }
}

/// What an empty offset chain means
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmptyChain {
    /// Read or write directly at the base address
    #[default]
    Direct,
    /// Dereference the base address once before the terminal operation.
    ///
    /// Compatibility mode for callers that relied on the older walk, which
    /// always applied one level of indirection.
    LegacyDereference,
}

/// Resolve the terminal address of a chain.
///
/// `read` fills the buffer from the target and returns the number of bytes
/// transferred. Returns `None` as soon as a pointer read comes back short.
pub(crate) fn resolve_chain<F>(
    mut read: F,
    base: u64,
    offsets: &[i64],
    width: PointerWidth,
    empty: EmptyChain,
) -> Option<u64>
where
    F: FnMut(u64, &mut [u8]) -> usize,
{
    if offsets.is_empty() {
        return match empty {
            EmptyChain::Direct => Some(base),
            // The old walk adjusted by the chain element at index 1, which an
            // empty chain never has.
            EmptyChain::LegacyDereference => read_pointer(&mut read, base, width),
        };
    }

    offsets.iter().try_fold(base, |address, &offset| {
        let pointer = read_pointer(&mut read, address, width)?;
        let next = width.apply(pointer, offset);
        trace!("chain: [0x{:X}] = 0x{:X} {:+} -> 0x{:X}", address, pointer, offset, next);
        Some(next)
    })
}

fn read_pointer<F>(read: &mut F, address: u64, width: PointerWidth) -> Option<u64>
where
    F: FnMut(u64, &mut [u8]) -> usize,
{
    let mut buffer = [0u8; 8];
    let slot = &mut buffer[..width.bytes()];
    let transferred = read(address, slot);
    if transferred < slot.len() {
        trace!(
            "chain: short pointer read at 0x{:X} ({}/{} bytes)",
            address,
            transferred,
            slot.len()
        );
        return None;
    }
    Some(width.decode(slot))
}
