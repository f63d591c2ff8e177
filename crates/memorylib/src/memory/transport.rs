//! Raw memory transport
//!
//! The only seam where the crate touches the operating system. Everything
//! above it is plain logic over bytes already in hand.

use crate::error::Result;

/// OS process handle carried between [`MemoryAccess`](super::MemoryAccess)
/// and its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub isize);

/// Page protection requested for an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protection {
    ReadOnly,
    ReadWrite,
    ExecuteRead,
    #[default]
    ExecuteReadWrite,
}

/// Platform primitives for reading and writing another process's memory.
///
/// Read and write report the number of bytes actually transferred and never
/// fail loudly; callers compare the count against what they asked for.
pub trait MemoryTransport {
    /// Open a handle with read, write, query and VM operation rights.
    fn open(&self, pid: u32) -> Result<RawHandle>;

    /// Release a handle. Returns `false` if the OS reports failure.
    fn close(&self, handle: RawHandle) -> bool;

    fn read(&self, handle: RawHandle, address: u64, buffer: &mut [u8]) -> usize;

    fn write(&self, handle: RawHandle, address: u64, bytes: &[u8]) -> usize;

    /// Commit `size` bytes inside the target. Returns 0 on failure.
    fn allocate(&self, handle: RawHandle, size: usize, protection: Protection) -> u64;

    fn free(&self, handle: RawHandle, address: u64) -> bool;

    fn has_exited(&self, handle: RawHandle) -> bool;

    /// Base address of the process's primary module
    fn main_module_base(&self, handle: RawHandle) -> Result<u64>;
}

impl<T: MemoryTransport + ?Sized> MemoryTransport for &T {
    fn open(&self, pid: u32) -> Result<RawHandle> {
        (**self).open(pid)
    }

    fn close(&self, handle: RawHandle) -> bool {
        (**self).close(handle)
    }

    fn read(&self, handle: RawHandle, address: u64, buffer: &mut [u8]) -> usize {
        (**self).read(handle, address, buffer)
    }

    fn write(&self, handle: RawHandle, address: u64, bytes: &[u8]) -> usize {
        (**self).write(handle, address, bytes)
    }

    fn allocate(&self, handle: RawHandle, size: usize, protection: Protection) -> u64 {
        (**self).allocate(handle, size, protection)
    }

    fn free(&self, handle: RawHandle, address: u64) -> bool {
        (**self).free(handle, address)
    }

    fn has_exited(&self, handle: RawHandle) -> bool {
        (**self).has_exited(handle)
    }

    fn main_module_base(&self, handle: RawHandle) -> Result<u64> {
        (**self).main_module_base(handle)
    }
}
