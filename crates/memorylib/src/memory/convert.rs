//! Numeric helpers for raw memory values
//!
//! Target memory stores integers little-endian; these helpers render them
//! most-significant byte first and parse them back.

use crate::error::{Error, Result};

/// Render a little-endian buffer as an uppercase big-endian hex string.
///
/// `[0x78, 0x56, 0x34, 0x12]` becomes `"12345678"`.
pub fn bytes_to_hex(buffer: &[u8]) -> String {
    buffer.iter().rev().map(|b| format!("{:02X}", b)).collect()
}

/// Format an address as uppercase hex without prefix or padding
pub fn to_hex(value: u64) -> String {
    format!("{:X}", value)
}

/// Parse a hex string (optional `0x` prefix) into a `u64`
pub fn hex_to_u64(hex: &str) -> Result<u64> {
    u64::from_str_radix(strip_prefix(hex), 16).map_err(|_| Error::InvalidHex(hex.to_string()))
}

/// Parse a hex string (optional `0x` prefix) into a `u32`
pub fn hex_to_u32(hex: &str) -> Result<u32> {
    u32::from_str_radix(strip_prefix(hex), 16).map_err(|_| Error::InvalidHex(hex.to_string()))
}

/// Reinterpret the bits of a 4-byte hex value as an IEEE-754 single
pub fn hex_to_f32(hex: &str) -> Result<f32> {
    hex_to_u32(hex).map(f32::from_bits)
}

/// Unsigned value of up to 4 little-endian bytes; missing bytes read as zero
pub fn u32_from_le(buffer: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    let len = buffer.len().min(4);
    bytes[..len].copy_from_slice(&buffer[..len]);
    u32::from_le_bytes(bytes)
}

/// Unsigned value of up to 8 little-endian bytes; missing bytes read as zero
pub fn u64_from_le(buffer: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    let len = buffer.len().min(8);
    bytes[..len].copy_from_slice(&buffer[..len]);
    u64::from_le_bytes(bytes)
}

fn strip_prefix(hex: &str) -> &str {
    let hex = hex.trim();
    hex.strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex)
}
