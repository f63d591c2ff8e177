use std::io::{Seek, SeekFrom};

use strum::Display;
use tracing::debug;

use crate::memory::{ReadMemory, zeroed};

use super::pattern::Pattern;
use super::region::{DumpError, DumpedRegion};
use super::target::{PositionGuard, ScanStream, ScanTarget, read_up_to};

/// Whether a scanner currently holds a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ScanState {
    Unscanned,
    Dumped,
}

/// Search window and result adjustment for a pattern search.
///
/// All zero by default: search the whole region, return the match address
/// unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Absolute address to start at; 0 means the region base
    pub start_address: u64,
    /// Region-relative upper bound on match positions; 0 means the whole
    /// region
    pub length: u64,
    /// Added to the address of the match
    pub result_offset: i64,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self, address: u64) -> Self {
        self.start_address = address;
        self
    }

    pub fn length(mut self, length: u64) -> Self {
        self.length = length;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.result_offset = offset;
        self
    }
}

/// Dumps a region once and searches it for masked byte patterns.
///
/// Searches never fail loudly: an unusable target, a short dump, or a bad
/// pattern all come back as `None`. Use [`SignatureScanner::dump_memory`]
/// to find out why a dump failed.
#[derive(Debug)]
pub struct SignatureScanner<'a> {
    target: ScanTarget<'a>,
    region: Option<DumpedRegion>,
}

impl<'a> SignatureScanner<'a> {
    pub fn new(target: ScanTarget<'a>) -> Self {
        Self {
            target,
            region: None,
        }
    }

    /// Scan `size` bytes of a live process starting at `base`
    pub fn for_process(memory: &'a dyn ReadMemory, base: u64, size: usize) -> Self {
        Self::new(ScanTarget::Process { memory, base, size })
    }

    /// Scan a stream from its current position to its end
    pub fn for_stream(stream: &'a mut dyn ScanStream) -> Self {
        Self::for_stream_at(stream, 0)
    }

    /// Scan a stream starting `offset` bytes past its current position.
    /// Match addresses are reported relative to that offset.
    pub fn for_stream_at(stream: &'a mut dyn ScanStream, offset: u64) -> Self {
        Self::new(ScanTarget::Stream {
            stream,
            offset,
            size: None,
        })
    }

    pub fn target(&self) -> &ScanTarget<'a> {
        &self.target
    }

    /// Replace the target. The cached region belongs to the old target and
    /// is discarded.
    pub fn retarget(&mut self, target: ScanTarget<'a>) {
        self.target = target;
        self.region = None;
    }

    pub fn state(&self) -> ScanState {
        match self.region {
            Some(_) => ScanState::Dumped,
            None => ScanState::Unscanned,
        }
    }

    pub fn region(&self) -> Option<&DumpedRegion> {
        self.region.as_ref()
    }

    /// Capture the target into a fresh region, replacing any cached one.
    ///
    /// On failure no region is cached.
    pub fn dump_memory(&mut self) -> Result<(), DumpError> {
        self.region = None;
        match capture(&mut self.target) {
            Ok(region) => {
                debug!(
                    "Dumped {} bytes at 0x{:X}",
                    region.len(),
                    region.base()
                );
                self.region = Some(region);
                Ok(())
            }
            Err(e) => {
                debug!("Dump of {:?} failed: {}", self.target, e);
                Err(e)
            }
        }
    }

    /// Discard the cached region so the next search re-reads the target
    pub fn reset_region(&mut self) {
        self.region = None;
    }

    fn ensure_region(&mut self) -> Option<&DumpedRegion> {
        if self.region.is_none() {
            self.dump_memory().ok()?;
        }
        self.region.as_ref()
    }

    /// Address of the first match inside the window, plus the result offset
    pub fn find_pattern(&mut self, pattern: &Pattern, options: FindOptions) -> Option<u64> {
        let region = self.ensure_region()?;
        let mut matches = matches_in(region, pattern, &options)?;
        matches
            .next()
            .map(|position| match_address(region, position, &options))
    }

    /// Every match inside the window, in address order
    pub fn find_all(&mut self, pattern: &Pattern, options: FindOptions) -> Vec<u64> {
        let Some(region) = self.ensure_region() else {
            return Vec::new();
        };
        match matches_in(region, pattern, &options) {
            Some(matches) => matches
                .map(|position| match_address(region, position, &options))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Search with raw bytes and an `x`/`?` mask.
    ///
    /// The region is dumped before the mask is checked, so an invalid mask
    /// still primes the cache.
    pub fn find(&mut self, bytes: &[u8], mask: &str, options: FindOptions) -> Option<u64> {
        self.ensure_region()?;
        let pattern = Pattern::new(bytes, mask)
            .inspect_err(|e| debug!("Rejected pattern: {}", e))
            .ok()?;
        self.find_pattern(&pattern, options)
    }

    /// Search with an all-`x` mask
    pub fn find_exact(&mut self, bytes: &[u8], options: FindOptions) -> Option<u64> {
        self.ensure_region()?;
        let pattern = Pattern::exact(bytes)
            .inspect_err(|e| debug!("Rejected pattern: {}", e))
            .ok()?;
        self.find_pattern(&pattern, options)
    }
}

fn capture(target: &mut ScanTarget<'_>) -> Result<DumpedRegion, DumpError> {
    match target {
        ScanTarget::Process { memory, base, size } => {
            if *base == 0 {
                return Err(DumpError::NullBaseAddress);
            }
            if !memory.is_alive() {
                return Err(DumpError::ProcessExited);
            }
            if *size == 0 {
                return Err(DumpError::ZeroSize);
            }

            let mut bytes = zeroed(*size).map_err(|_| DumpError::Allocation { size: *size })?;
            let read = memory.read_into(*base, &mut bytes);
            if read != *size {
                return Err(DumpError::ShortRead {
                    requested: *size,
                    read,
                });
            }
            Ok(DumpedRegion::new(*base, bytes))
        }
        ScanTarget::Stream {
            stream,
            offset,
            size,
        } => {
            let mut guard = PositionGuard::new(&mut **stream)?;
            let start = guard.origin().saturating_add(*offset);
            let size = match *size {
                Some(size) => size,
                None => {
                    let end = guard.seek(SeekFrom::End(0))?;
                    usize::try_from(end.saturating_sub(start)).unwrap_or(usize::MAX)
                }
            };
            if size == 0 {
                return Err(DumpError::ZeroSize);
            }

            let mut bytes = zeroed(size).map_err(|_| DumpError::Allocation { size })?;
            guard.seek(SeekFrom::Start(start))?;
            let read = read_up_to(&mut *guard, &mut bytes)?;
            drop(guard);

            if read != size {
                return Err(DumpError::ShortRead {
                    requested: size,
                    read,
                });
            }
            Ok(DumpedRegion::new(*offset, bytes))
        }
    }
}

/// Region positions where `pattern` matches, restricted to the window.
///
/// `None` when the window is empty or starts before the region.
fn matches_in<'r>(
    region: &'r DumpedRegion,
    pattern: &'r Pattern,
    options: &FindOptions,
) -> Option<Box<dyn Iterator<Item = usize> + 'r>> {
    let bytes = region.as_bytes();
    let effective_start = if options.start_address > 0 {
        options.start_address
    } else {
        region.base()
    };
    let start = region.position_of(effective_start)?;
    let end = if options.length > 0 {
        usize::try_from(options.length)
            .unwrap_or(usize::MAX)
            .min(bytes.len())
    } else {
        bytes.len()
    };
    // Only required bytes must fit; trailing wildcards may overhang the end
    let last = end.min(bytes.len().checked_sub(pattern.required_len())? + 1);
    if start >= last {
        return None;
    }

    Some(match pattern.anchor() {
        Some((index, byte)) => Box::new(
            memchr::memchr_iter(byte, &bytes[start + index..last + index])
                .map(move |hit| start + hit)
                .filter(move |&position| pattern.matches_at(&bytes[position..])),
        ),
        // All wildcards: every position in the window matches
        None => Box::new(start..last),
    })
}

fn match_address(region: &DumpedRegion, position: usize, options: &FindOptions) -> u64 {
    region
        .address_of(position)
        .wrapping_add_signed(options.result_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessConfig;
    use crate::memory::{MemoryAccess, MockTransport};
    use std::io::{self, Cursor, Read, Write};

    const REGION: [u8; 5] = [0x90, 0x11, 0x22, 0x90, 0x33];

    fn transport() -> MockTransport {
        MockTransport::builder().segment(0x1000, &REGION).build()
    }

    #[test]
    fn test_exact_match_returns_first_address() {
        let transport = transport();
        let access = MemoryAccess::open(&transport, 1, AccessConfig::default()).unwrap();
        let mut scanner = SignatureScanner::for_process(&access, 0x1000, REGION.len());

        assert_eq!(
            scanner.find(&[0x11, 0x22], "xx", FindOptions::default()),
            Some(0x1001)
        );
        assert_eq!(
            scanner.find(&[0xAA, 0xBB], "xx", FindOptions::default()),
            None
        );
        assert_eq!(
            scanner.find(&[0x90, 0xFF], "x?", FindOptions::default()),
            Some(0x1000)
        );
        assert_eq!(
            scanner.find_exact(&[0x90, 0x33], FindOptions::default()),
            Some(0x1003)
        );
        // One dump served every search
        assert_eq!(transport.read_count(), 1);
    }

    #[test]
    fn test_wildcard_only_mask_matches_window_start() {
        let transport = transport();
        let access = MemoryAccess::open(&transport, 1, AccessConfig::default()).unwrap();
        let mut scanner = SignatureScanner::for_process(&access, 0x1000, REGION.len());

        assert_eq!(
            scanner.find(&[0xAA, 0xBB, 0xCC], "???", FindOptions::default()),
            Some(0x1000)
        );
        assert_eq!(
            scanner.find(&[0xAA], "?", FindOptions::new().start(0x1003)),
            Some(0x1003)
        );
        // Wildcards may overhang the end of the region
        assert_eq!(
            scanner.find(&[0xAA, 0xBB], "??", FindOptions::new().start(0x1004)),
            Some(0x1004)
        );
        assert_eq!(
            scanner.find(&[0; 6], "??????", FindOptions::default()),
            Some(0x1000)
        );
        // Empty window
        assert_eq!(
            scanner.find(&[0xAA], "?", FindOptions::new().start(0x1005)),
            None
        );
        assert_eq!(
            scanner.find(&[0xAA], "?", FindOptions::new().start(0x1003).length(3)),
            None
        );
    }

    #[test]
    fn test_mask_length_mismatch_is_not_found() {
        let transport = transport();
        let access = MemoryAccess::open(&transport, 1, AccessConfig::default()).unwrap();
        let mut scanner = SignatureScanner::for_process(&access, 0x1000, REGION.len());

        assert_eq!(scanner.find(&[0x90], "xx", FindOptions::default()), None);
        assert_eq!(scanner.find(&[0x90, 0x11], "x", FindOptions::default()), None);
        // The dump still happened
        assert_eq!(scanner.state(), ScanState::Dumped);
    }

    #[test]
    fn test_invalid_mask_character_and_empty_pattern() {
        let transport = transport();
        let access = MemoryAccess::open(&transport, 1, AccessConfig::default()).unwrap();
        let mut scanner = SignatureScanner::for_process(&access, 0x1000, REGION.len());

        assert_eq!(scanner.find(&[0x90, 0x11], "xz", FindOptions::default()), None);
        assert_eq!(scanner.find(&[], "", FindOptions::default()), None);
        assert_eq!(scanner.find_exact(&[], FindOptions::default()), None);
    }

    #[test]
    fn test_window_start_length_and_offset() {
        let transport = transport();
        let access = MemoryAccess::open(&transport, 1, AccessConfig::default()).unwrap();
        let mut scanner = SignatureScanner::for_process(&access, 0x1000, REGION.len());
        let nop = Pattern::exact(&[0x90]).unwrap();

        assert_eq!(scanner.find_pattern(&nop, FindOptions::default()), Some(0x1000));
        assert_eq!(
            scanner.find_pattern(&nop, FindOptions::new().start(0x1001)),
            Some(0x1003)
        );
        // Upper bound is region-relative
        assert_eq!(
            scanner.find_pattern(&nop, FindOptions::new().start(0x1001).length(3)),
            None
        );
        assert_eq!(
            scanner.find_pattern(&nop, FindOptions::new().start(0x1001).length(4)),
            Some(0x1003)
        );
        assert_eq!(
            scanner.find_pattern(&nop, FindOptions::new().offset(-0x10)),
            Some(0xFF0)
        );
        assert_eq!(
            scanner.find_pattern(&nop, FindOptions::new().start(0x1001).offset(2)),
            Some(0x1005)
        );
        // Start before the region
        assert_eq!(scanner.find_pattern(&nop, FindOptions::new().start(0x800)), None);
        // Length larger than the region is clamped
        assert_eq!(
            scanner.find_pattern(&nop, FindOptions::new().start(0x1002).length(0x1000)),
            Some(0x1003)
        );
    }

    #[test]
    fn test_pattern_longer_than_region() {
        let transport = transport();
        let access = MemoryAccess::open(&transport, 1, AccessConfig::default()).unwrap();
        let mut scanner = SignatureScanner::for_process(&access, 0x1000, REGION.len());
        let pattern = Pattern::parse("90 11 22 90 33 44").unwrap();
        assert_eq!(scanner.find_pattern(&pattern, FindOptions::default()), None);
        // Trailing wildcard past the end still matches
        let pattern = Pattern::parse("33 ??").unwrap();
        assert_eq!(scanner.find_pattern(&pattern, FindOptions::default()), Some(0x1004));
        assert_eq!(scanner.find(&[0x33, 0x00], "x?", FindOptions::default()), Some(0x1004));
        // A required byte past the end never matches
        let pattern = Pattern::parse("33 ?? 44").unwrap();
        assert_eq!(scanner.find_pattern(&pattern, FindOptions::default()), None);
        let pattern = Pattern::parse("?? ?? ?? ?? ?? 90").unwrap();
        assert_eq!(scanner.find_pattern(&pattern, FindOptions::default()), None);
    }

    #[test]
    fn test_oversized_dump_is_not_found() {
        let transport = transport();
        let access = MemoryAccess::open(&transport, 1, AccessConfig::default()).unwrap();
        let mut scanner = SignatureScanner::for_process(&access, 0x1000, usize::MAX);

        assert!(matches!(
            scanner.dump_memory(),
            Err(DumpError::Allocation { size: usize::MAX })
        ));
        assert_eq!(scanner.find_exact(&[0x90], FindOptions::default()), None);
        assert_eq!(scanner.state(), ScanState::Unscanned);
        assert_eq!(transport.read_count(), 0);

        let mut cursor = Cursor::new(REGION.to_vec());
        let mut scanner = SignatureScanner::new(ScanTarget::Stream {
            stream: &mut cursor,
            offset: 0,
            size: Some(usize::MAX),
        });
        assert_eq!(scanner.find_exact(&[0x90], FindOptions::default()), None);
        assert_eq!(scanner.state(), ScanState::Unscanned);
    }

    #[test]
    fn test_find_all() {
        let transport = transport();
        let access = MemoryAccess::open(&transport, 1, AccessConfig::default()).unwrap();
        let mut scanner = SignatureScanner::for_process(&access, 0x1000, REGION.len());

        let nop = Pattern::exact(&[0x90]).unwrap();
        assert_eq!(
            scanner.find_all(&nop, FindOptions::default()),
            vec![0x1000, 0x1003]
        );
        assert_eq!(
            scanner.find_all(&nop, FindOptions::new().offset(1)),
            vec![0x1001, 0x1004]
        );
        let any_pair = Pattern::parse("?? ??").unwrap();
        assert_eq!(
            scanner.find_all(&any_pair, FindOptions::default()),
            vec![0x1000, 0x1001, 0x1002, 0x1003, 0x1004]
        );
    }

    #[test]
    fn test_reset_forces_redump() {
        let transport = transport();
        let access = MemoryAccess::open(&transport, 1, AccessConfig::default()).unwrap();
        let mut scanner = SignatureScanner::for_process(&access, 0x1000, REGION.len());

        assert_eq!(scanner.state(), ScanState::Unscanned);
        assert_eq!(scanner.find_exact(&[0x22], FindOptions::default()), Some(0x1002));
        assert_eq!(scanner.state(), ScanState::Dumped);
        assert_eq!(transport.read_count(), 1);

        // Stale snapshot until reset
        access.write(0x1002, &[0x44]);
        assert_eq!(scanner.find_exact(&[0x22], FindOptions::default()), Some(0x1002));
        assert_eq!(transport.read_count(), 1);

        scanner.reset_region();
        assert_eq!(scanner.state(), ScanState::Unscanned);
        assert_eq!(scanner.find_exact(&[0x22], FindOptions::default()), None);
        assert_eq!(scanner.find_exact(&[0x44], FindOptions::default()), Some(0x1002));
        assert_eq!(transport.read_count(), 2);
    }

    #[test]
    fn test_short_dump_is_total_failure() {
        let transport = transport();
        let access = MemoryAccess::open(&transport, 1, AccessConfig::default()).unwrap();
        // Region runs 3 bytes past the mapped segment
        let mut scanner = SignatureScanner::for_process(&access, 0x1000, REGION.len() + 3);

        assert!(matches!(
            scanner.dump_memory(),
            Err(DumpError::ShortRead {
                requested: 8,
                read: 5
            })
        ));
        assert!(scanner.region().is_none());

        // Each search retries the dump
        assert_eq!(scanner.find_exact(&[0x90], FindOptions::default()), None);
        assert_eq!(scanner.find_exact(&[0x90], FindOptions::default()), None);
        assert_eq!(transport.read_count(), 3);
        assert_eq!(scanner.state(), ScanState::Unscanned);
    }

    #[test]
    fn test_invalid_process_targets() {
        let transport = transport();
        let access = MemoryAccess::open(&transport, 1, AccessConfig::default()).unwrap();

        let mut scanner = SignatureScanner::for_process(&access, 0, 5);
        assert!(matches!(scanner.dump_memory(), Err(DumpError::NullBaseAddress)));

        let mut scanner = SignatureScanner::for_process(&access, 0x1000, 0);
        assert!(matches!(scanner.dump_memory(), Err(DumpError::ZeroSize)));
        assert_eq!(scanner.find_exact(&[0x90], FindOptions::default()), None);

        transport.set_exited(true);
        let mut scanner = SignatureScanner::for_process(&access, 0x1000, 5);
        assert!(matches!(scanner.dump_memory(), Err(DumpError::ProcessExited)));
        assert_eq!(transport.read_count(), 0);
    }

    #[test]
    fn test_failed_redump_discards_previous_region() {
        let transport = transport();
        let access = MemoryAccess::open(&transport, 1, AccessConfig::default()).unwrap();
        let mut scanner = SignatureScanner::for_process(&access, 0x1000, REGION.len());

        scanner.dump_memory().unwrap();
        transport.set_exited(true);
        assert!(scanner.dump_memory().is_err());
        assert!(scanner.region().is_none());
    }

    #[test]
    fn test_stream_dump_restores_position() {
        let mut data = vec![0u8; 0x20];
        data[0x18..0x1B].copy_from_slice(&[0xDE, 0xAD, 0x01]);
        let mut cursor = Cursor::new(data);
        cursor.set_position(4);

        {
            let mut scanner = SignatureScanner::for_stream_at(&mut cursor, 0x10);
            scanner.dump_memory().unwrap();
            let region = scanner.region().unwrap();
            assert_eq!(region.base(), 0x10);
            // From position 4 + offset 0x10 to the end
            assert_eq!(region.len(), 0x0C);
            assert_eq!(
                scanner.find(&[0xDE, 0xAD], "xx", FindOptions::default()),
                Some(0x14)
            );
        }
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn test_stream_with_explicit_size() {
        let mut cursor = Cursor::new((0u8..=0x3F).collect::<Vec<_>>());
        {
            let mut scanner = SignatureScanner::new(ScanTarget::Stream {
                stream: &mut cursor,
                offset: 0x20,
                size: Some(0x10),
            });
            assert_eq!(
                scanner.find_exact(&[0x2A, 0x2B], FindOptions::default()),
                Some(0x2A)
            );
            assert_eq!(scanner.find_exact(&[0x30], FindOptions::default()), None);
        }
        {
            let mut scanner = SignatureScanner::new(ScanTarget::Stream {
                stream: &mut cursor,
                offset: 0x38,
                size: Some(0x10),
            });
            assert!(matches!(
                scanner.dump_memory(),
                Err(DumpError::ShortRead {
                    requested: 0x10,
                    read: 8
                })
            ));
        }
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_empty_stream_is_zero_size() {
        let mut cursor = Cursor::new(Vec::new());
        let mut scanner = SignatureScanner::for_stream(&mut cursor);
        assert!(matches!(scanner.dump_memory(), Err(DumpError::ZeroSize)));
    }

    struct FailingStream {
        inner: Cursor<Vec<u8>>,
    }

    impl Read for FailingStream {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("device gone"))
        }
    }

    impl Write for FailingStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FailingStream {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_stream_error_restores_position() {
        let mut stream = FailingStream {
            inner: Cursor::new(vec![0x90; 8]),
        };
        stream.inner.set_position(2);
        {
            let mut scanner = SignatureScanner::for_stream_at(&mut stream, 1);
            assert!(matches!(scanner.dump_memory(), Err(DumpError::Io(_))));
            assert_eq!(scanner.find_exact(&[0x90], FindOptions::default()), None);
            assert_eq!(scanner.state(), ScanState::Unscanned);
        }
        assert_eq!(stream.inner.position(), 2);
    }

    #[test]
    fn test_retarget_discards_region() {
        let transport = transport();
        let access = MemoryAccess::open(&transport, 1, AccessConfig::default()).unwrap();
        let mut scanner = SignatureScanner::for_process(&access, 0x1000, REGION.len());
        scanner.dump_memory().unwrap();

        scanner.retarget(ScanTarget::Process {
            memory: &access,
            base: 0x1002,
            size: 3,
        });
        assert_eq!(scanner.state(), ScanState::Unscanned);
        assert_eq!(scanner.target().base(), 0x1002);
        assert_eq!(scanner.find_exact(&[0x90], FindOptions::default()), Some(0x1003));
    }
}
