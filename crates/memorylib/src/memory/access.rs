use tracing::{debug, warn};

use crate::config::AccessConfig;
use crate::error::{Error, Result};

use super::chain::resolve_chain;
use super::convert::to_hex;
use super::reader::{ReadMemory, zeroed};
use super::transport::{MemoryTransport, Protection, RawHandle};

/// Open handle to one external process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetHandle {
    pid: u32,
    raw: RawHandle,
}

impl TargetHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn raw(&self) -> RawHandle {
        self.raw
    }
}

/// Result of a read: the buffer always has the requested length, the tail
/// past `bytes_read` is zeroed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    pub buffer: Vec<u8>,
    pub bytes_read: usize,
}

impl ReadOutcome {
    pub fn is_complete(&self) -> bool {
        self.bytes_read == self.buffer.len()
    }

    /// The buffer, only if every requested byte was transferred
    pub fn into_complete(self) -> Option<Vec<u8>> {
        self.is_complete().then_some(self.buffer)
    }
}

/// Result of a chain write: the resolved terminal address and the number
/// of bytes written there. `address` is 0 when the walk could not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainWrite {
    pub address: u64,
    pub bytes_written: usize,
}

impl ChainWrite {
    pub fn address_hex(&self) -> String {
        to_hex(self.address)
    }
}

/// Reads, writes and allocations against one open target process.
///
/// Obtained only from [`MemoryAccess::open`]; the handle is released by
/// [`MemoryAccess::close`] or when the value is dropped. No internal
/// synchronization: share across threads behind a mutex.
pub struct MemoryAccess<T: MemoryTransport> {
    transport: T,
    handle: TargetHandle,
    config: AccessConfig,
    closed: bool,
}

impl<T: MemoryTransport> MemoryAccess<T> {
    pub fn open(transport: T, pid: u32, config: AccessConfig) -> Result<Self> {
        let raw = transport.open(pid)?;
        debug!(
            "Opened process {} (handle {:#x}, pointer width {})",
            pid, raw.0, config.pointer_width
        );
        Ok(Self {
            transport,
            handle: TargetHandle { pid, raw },
            config,
            closed: false,
        })
    }

    /// Release the handle, reporting OS-level failure
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        if self.transport.close(self.handle.raw) {
            debug!("Closed process {}", self.handle.pid);
            Ok(())
        } else {
            Err(Error::HandleCloseFailed {
                pid: self.handle.pid,
            })
        }
    }

    pub fn handle(&self) -> &TargetHandle {
        &self.handle
    }

    pub fn pid(&self) -> u32 {
        self.handle.pid
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn has_exited(&self) -> bool {
        self.transport.has_exited(self.handle.raw)
    }

    pub fn main_module_base(&self) -> Result<u64> {
        self.transport.main_module_base(self.handle.raw)
    }

    pub fn main_module_base_hex(&self) -> Result<String> {
        self.main_module_base().map(to_hex)
    }

    /// Read `size` bytes at `address`. Short reads are reported through
    /// `bytes_read`, not as errors; only a buffer that cannot be allocated
    /// fails.
    pub fn read(&self, address: u64, size: usize) -> Result<ReadOutcome> {
        let mut buffer = zeroed_buffer(size)?;
        let bytes_read = self.transport.read(self.handle.raw, address, &mut buffer);
        if bytes_read < size {
            debug!(
                "Short read at 0x{:X}: {}/{} bytes",
                address, bytes_read, size
            );
        }
        Ok(ReadOutcome { buffer, bytes_read })
    }

    /// Write all of `bytes` at `address`, returning the count written
    pub fn write(&self, address: u64, bytes: &[u8]) -> usize {
        let written = self.transport.write(self.handle.raw, address, bytes);
        if written < bytes.len() {
            debug!(
                "Short write at 0x{:X}: {}/{} bytes",
                address,
                written,
                bytes.len()
            );
        }
        written
    }

    /// Commit execute-read-write memory inside the target
    pub fn allocate(&self, size: usize) -> Option<u64> {
        self.allocate_with(size, Protection::ExecuteReadWrite)
    }

    pub fn allocate_with(&self, size: usize, protection: Protection) -> Option<u64> {
        let address = self.transport.allocate(self.handle.raw, size, protection);
        if address == 0 {
            debug!("Allocation of {} bytes failed", size);
            return None;
        }
        debug!("Allocated {} bytes at 0x{:X}", size, address);
        Some(address)
    }

    pub fn deallocate(&self, address: u64) -> bool {
        self.transport.free(self.handle.raw, address)
    }

    /// Walk `offsets` from `base` and return the terminal address
    pub fn resolve_chain(&self, base: u64, offsets: &[i64]) -> Option<u64> {
        resolve_chain(
            |address, buffer| self.transport.read(self.handle.raw, address, buffer),
            base,
            offsets,
            self.config.pointer_width,
            self.config.empty_chain,
        )
    }

    /// Walk `offsets` from `base`, then read `size` bytes at the result.
    ///
    /// A broken walk yields a zeroed buffer with `bytes_read == 0`.
    pub fn read_chain(&self, base: u64, offsets: &[i64], size: usize) -> Result<ReadOutcome> {
        match self.resolve_chain(base, offsets) {
            Some(address) => self.read(address, size),
            None => {
                debug!(
                    "Pointer chain from 0x{:X} ({} offsets) did not resolve",
                    base,
                    offsets.len()
                );
                Ok(ReadOutcome {
                    buffer: zeroed_buffer(size)?,
                    bytes_read: 0,
                })
            }
        }
    }

    /// Walk `offsets` from `base`, then write `bytes` at the result
    pub fn write_chain(&self, base: u64, offsets: &[i64], bytes: &[u8]) -> ChainWrite {
        match self.resolve_chain(base, offsets) {
            Some(address) => ChainWrite {
                address,
                bytes_written: self.write(address, bytes),
            },
            None => {
                debug!(
                    "Pointer chain from 0x{:X} ({} offsets) did not resolve",
                    base,
                    offsets.len()
                );
                ChainWrite {
                    address: 0,
                    bytes_written: 0,
                }
            }
        }
    }
}

fn zeroed_buffer(size: usize) -> Result<Vec<u8>> {
    zeroed(size).map_err(|_| Error::Allocation { size })
}

impl<T: MemoryTransport> ReadMemory for MemoryAccess<T> {
    fn read_into(&self, address: u64, buffer: &mut [u8]) -> usize {
        self.transport.read(self.handle.raw, address, buffer)
    }

    fn is_alive(&self) -> bool {
        !self.has_exited()
    }
}

impl<T: MemoryTransport> Drop for MemoryAccess<T> {
    fn drop(&mut self) {
        if !self.closed && !self.transport.close(self.handle.raw) {
            warn!("Failed to close handle for process {}", self.handle.pid);
        }
    }
}
