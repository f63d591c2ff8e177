use std::collections::TryReserveError;

use super::chain::PointerWidth;
use super::convert::{u32_from_le, u64_from_le};

/// Zero-filled buffer of `size` bytes, reporting allocation failure
/// instead of aborting
pub(crate) fn zeroed(size: usize) -> Result<Vec<u8>, TryReserveError> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(size)?;
    buffer.resize(size, 0);
    Ok(buffer)
}

/// Read access to a live address space.
///
/// Implementors only provide the raw transfer and a liveness check; typed
/// helpers return `None` when fewer bytes than needed came back.
pub trait ReadMemory {
    /// Fill `buffer` from `address`, returning the number of bytes transferred
    fn read_into(&self, address: u64, buffer: &mut [u8]) -> usize;

    /// Whether the target can still be read at all
    fn is_alive(&self) -> bool;

    fn read_bytes(&self, address: u64, size: usize) -> Option<Vec<u8>> {
        let mut buffer = zeroed(size).ok()?;
        (self.read_into(address, &mut buffer) == size).then_some(buffer)
    }

    fn read_u32(&self, address: u64) -> Option<u32> {
        self.read_bytes(address, 4).map(|b| u32_from_le(&b))
    }

    fn read_u64(&self, address: u64) -> Option<u64> {
        self.read_bytes(address, 8).map(|b| u64_from_le(&b))
    }

    fn read_i32(&self, address: u64) -> Option<i32> {
        self.read_u32(address).map(|v| v as i32)
    }

    fn read_f32(&self, address: u64) -> Option<f32> {
        self.read_u32(address).map(f32::from_bits)
    }

    fn read_pointer(&self, address: u64, width: PointerWidth) -> Option<u64> {
        self.read_bytes(address, width.bytes())
            .map(|b| width.decode(&b))
    }
}
