use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::{Deref, DerefMut};

use tracing::warn;

use crate::memory::ReadMemory;

/// Byte stream usable as an offline scan target
pub trait ScanStream: Read + Seek + Write {}

impl<S: Read + Seek + Write + ?Sized> ScanStream for S {}

/// What a [`SignatureScanner`](super::SignatureScanner) dumps
pub enum ScanTarget<'a> {
    /// `size` bytes of a live process starting at `base`
    Process {
        memory: &'a dyn ReadMemory,
        base: u64,
        size: usize,
    },
    /// `size` bytes of a stream starting `offset` bytes past its current
    /// position. `None` takes everything up to the end of the stream.
    Stream {
        stream: &'a mut dyn ScanStream,
        offset: u64,
        size: Option<usize>,
    },
}

impl ScanTarget<'_> {
    /// Address reported for the first byte of the dump
    pub fn base(&self) -> u64 {
        match self {
            Self::Process { base, .. } => *base,
            Self::Stream { offset, .. } => *offset,
        }
    }
}

impl fmt::Debug for ScanTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process { base, size, .. } => f
                .debug_struct("Process")
                .field("base", &format_args!("0x{:X}", base))
                .field("size", size)
                .finish(),
            Self::Stream { offset, size, .. } => f
                .debug_struct("Stream")
                .field("offset", &format_args!("0x{:X}", offset))
                .field("size", size)
                .finish(),
        }
    }
}

/// Restores the stream position it was created at when dropped
pub(crate) struct PositionGuard<'s, S: Seek + ?Sized> {
    stream: &'s mut S,
    origin: u64,
}

impl<'s, S: Seek + ?Sized> PositionGuard<'s, S> {
    pub(crate) fn new(stream: &'s mut S) -> io::Result<Self> {
        let origin = stream.stream_position()?;
        Ok(Self { stream, origin })
    }

    pub(crate) fn origin(&self) -> u64 {
        self.origin
    }
}

impl<S: Seek + ?Sized> Deref for PositionGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.stream
    }
}

impl<S: Seek + ?Sized> DerefMut for PositionGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.stream
    }
}

impl<S: Seek + ?Sized> Drop for PositionGuard<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.stream.seek(SeekFrom::Start(self.origin)) {
            warn!("Failed to restore stream position {}: {}", self.origin, e);
        }
    }
}

/// Read until `buffer` is full or the stream ends
pub(crate) fn read_up_to<R: Read + ?Sized>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_position_guard_restores_on_drop() {
        let mut cursor = Cursor::new(vec![0u8; 16]);
        cursor.set_position(3);
        {
            let mut guard = PositionGuard::new(&mut cursor).unwrap();
            assert_eq!(guard.origin(), 3);
            guard.seek(SeekFrom::Start(10)).unwrap();
            assert_eq!(guard.stream_position().unwrap(), 10);
        }
        assert_eq!(cursor.position(), 3);
    }

    #[test]
    fn test_read_up_to_stops_at_end() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);
        let mut buffer = [0u8; 5];
        assert_eq!(read_up_to(&mut cursor, &mut buffer).unwrap(), 3);
        assert_eq!(buffer, [1, 2, 3, 0, 0]);
    }
}
