//! In-memory transport for tests
//!
//! Memory is a set of non-overlapping segments. A transfer copies as much as
//! fits in the segment containing the start address, so reads running past a
//! segment end come back short like a partially unmapped region would.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

use super::transport::{MemoryTransport, Protection, RawHandle};

const ALLOCATION_BASE: u64 = 0x7000_0000;
const ALLOCATION_GRANULARITY: u64 = 0x1000;

/// Failure mode for [`MockTransport::open`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOpenFailure {
    AccessDenied,
    NoSuchProcess,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    segments: RefCell<BTreeMap<u64, Vec<u8>>>,
    module_base: u64,
    next_allocation: Cell<u64>,
    exited: Cell<bool>,
    open_failure: Cell<Option<MockOpenFailure>>,
    close_fails: Cell<bool>,
    opens: Cell<usize>,
    closes: Cell<usize>,
    writes: Cell<usize>,
    reads: RefCell<Vec<(u64, usize)>>,
}

impl MockTransport {
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    pub fn set_exited(&self, exited: bool) {
        self.exited.set(exited);
    }

    pub fn deny_open(&self, failure: Option<MockOpenFailure>) {
        self.open_failure.set(failure);
    }

    pub fn fail_close(&self, fails: bool) {
        self.close_fails.set(fails);
    }

    pub fn open_count(&self) -> usize {
        self.opens.get()
    }

    pub fn close_count(&self) -> usize {
        self.closes.get()
    }

    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    pub fn read_count(&self) -> usize {
        self.reads.borrow().len()
    }

    /// Every read so far as `(address, requested length)`
    pub fn read_log(&self) -> Vec<(u64, usize)> {
        self.reads.borrow().clone()
    }

    pub fn reset_counters(&self) {
        self.opens.set(0);
        self.closes.set(0);
        self.writes.set(0);
        self.reads.borrow_mut().clear();
    }

    /// Segment start and the offset of `address` within it
    fn locate(segments: &BTreeMap<u64, Vec<u8>>, address: u64) -> Option<(u64, usize)> {
        let (&start, bytes) = segments.range(..=address).next_back()?;
        let offset = usize::try_from(address - start).ok()?;
        (offset < bytes.len()).then_some((start, offset))
    }
}

impl MemoryTransport for MockTransport {
    fn open(&self, pid: u32) -> Result<RawHandle> {
        self.opens.set(self.opens.get() + 1);
        match self.open_failure.get() {
            Some(MockOpenFailure::AccessDenied) => Err(Error::AccessDenied { pid }),
            Some(MockOpenFailure::NoSuchProcess) => Err(Error::NoSuchProcess { pid }),
            None => Ok(RawHandle(pid as isize)),
        }
    }

    fn close(&self, _handle: RawHandle) -> bool {
        self.closes.set(self.closes.get() + 1);
        !self.close_fails.get()
    }

    fn read(&self, _handle: RawHandle, address: u64, buffer: &mut [u8]) -> usize {
        self.reads.borrow_mut().push((address, buffer.len()));
        let segments = self.segments.borrow();
        let Some((start, offset)) = Self::locate(&segments, address) else {
            return 0;
        };
        let source = &segments[&start][offset..];
        let len = source.len().min(buffer.len());
        buffer[..len].copy_from_slice(&source[..len]);
        len
    }

    fn write(&self, _handle: RawHandle, address: u64, bytes: &[u8]) -> usize {
        self.writes.set(self.writes.get() + 1);
        let mut segments = self.segments.borrow_mut();
        let Some((start, offset)) = Self::locate(&segments, address) else {
            return 0;
        };
        let Some(target) = segments.get_mut(&start) else {
            return 0;
        };
        let target = &mut target[offset..];
        let len = target.len().min(bytes.len());
        target[..len].copy_from_slice(&bytes[..len]);
        len
    }

    fn allocate(&self, _handle: RawHandle, size: usize, _protection: Protection) -> u64 {
        if size == 0 {
            return 0;
        }
        let address = self.next_allocation.get();
        let span = (size as u64).div_ceil(ALLOCATION_GRANULARITY) * ALLOCATION_GRANULARITY;
        self.next_allocation.set(address + span);
        self.segments.borrow_mut().insert(address, vec![0; size]);
        address
    }

    fn free(&self, _handle: RawHandle, address: u64) -> bool {
        if address < ALLOCATION_BASE {
            return false;
        }
        self.segments.borrow_mut().remove(&address).is_some()
    }

    fn has_exited(&self, _handle: RawHandle) -> bool {
        self.exited.get()
    }

    fn main_module_base(&self, _handle: RawHandle) -> Result<u64> {
        if self.exited.get() {
            return Err(Error::QueryFailed("process has exited".to_string()));
        }
        Ok(self.module_base)
    }
}

/// Builder for [`MockTransport`]
#[derive(Debug)]
pub struct MockTransportBuilder {
    segments: BTreeMap<u64, Vec<u8>>,
    module_base: u64,
}

impl Default for MockTransportBuilder {
    fn default() -> Self {
        Self {
            segments: BTreeMap::new(),
            module_base: 0x40_0000,
        }
    }
}

impl MockTransportBuilder {
    /// Map `bytes` at `address`
    pub fn segment(mut self, address: u64, bytes: &[u8]) -> Self {
        self.segments.insert(address, bytes.to_vec());
        self
    }

    pub fn write_u32(self, address: u64, value: u32) -> Self {
        self.segment(address, &value.to_le_bytes())
    }

    pub fn write_u64(self, address: u64, value: u64) -> Self {
        self.segment(address, &value.to_le_bytes())
    }

    pub fn module_base(mut self, base: u64) -> Self {
        self.module_base = base;
        self
    }

    pub fn build(self) -> MockTransport {
        MockTransport {
            segments: RefCell::new(self.segments),
            module_base: self.module_base,
            next_allocation: Cell::new(ALLOCATION_BASE),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_read_within_and_across_segment_end() {
        let mock = MockTransport::builder()
            .segment(0x100, &[1, 2, 3, 4])
            .build();
        let handle = mock.open(1).unwrap();

        let mut buffer = [0u8; 2];
        assert_eq!(mock.read(handle, 0x101, &mut buffer), 2);
        assert_eq!(buffer, [2, 3]);

        let mut buffer = [0u8; 4];
        assert_eq!(mock.read(handle, 0x102, &mut buffer), 2);
        assert_eq!(buffer, [3, 4, 0, 0]);

        assert_eq!(mock.read(handle, 0x104, &mut buffer), 0);
        assert_eq!(mock.read(handle, 0x50, &mut buffer), 0);
        assert_eq!(mock.read_count(), 4);
    }

    #[test]
    fn test_mock_allocations_do_not_overlap() {
        let mock = MockTransport::builder().build();
        let handle = mock.open(1).unwrap();
        let a = mock.allocate(handle, 0x10, Protection::ReadWrite);
        let b = mock.allocate(handle, 0x2001, Protection::ReadWrite);
        let c = mock.allocate(handle, 1, Protection::ReadWrite);
        assert_eq!(a, ALLOCATION_BASE);
        assert_eq!(b, ALLOCATION_BASE + 0x1000);
        assert_eq!(c, ALLOCATION_BASE + 0x4000);
        assert!(mock.free(handle, b));
    }
}
