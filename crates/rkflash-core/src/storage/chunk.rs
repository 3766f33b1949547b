//! Splitting LBA ranges into exchanges
//!
//! Loaders only accept large per-command sector counts when the overall
//! request is large. The thresholds are empirical device buffer limits, not
//! protocol constants.

use crate::error::{Error, Result};

/// Requests up to this many sectors use [`SMALL_CHUNK`]
pub const SMALL_REQUEST_LIMIT: u32 = 65536;
/// Sectors per exchange for small requests
pub const SMALL_CHUNK: u32 = 128;
/// Sectors per read/write exchange for large requests
pub const LARGE_RW_CHUNK: u32 = 16384;
/// Sectors per erase exchange for large requests
pub const LARGE_ERASE_CHUNK: u32 = 32768;

/// Which LBA command is being chunked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LbaOperation {
    /// `READ_LBA`
    Read,
    /// `WRITE_LBA`
    Write,
    /// `ERASE_LBA`
    Erase,
}

impl LbaOperation {
    /// Largest per-exchange sector count for a request of `total` sectors
    pub fn max_chunk(self, total: u32) -> u32 {
        if total <= SMALL_REQUEST_LIMIT {
            SMALL_CHUNK
        } else if self == LbaOperation::Erase {
            LARGE_ERASE_CHUNK
        } else {
            LARGE_RW_CHUNK
        }
    }
}

/// Iterator over `(first sector, sector count)` pairs
#[derive(Debug, Clone)]
pub struct LbaChunks {
    next: u32,
    remaining: u32,
    max: u32,
}

impl Iterator for LbaChunks {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let n = self.remaining.min(self.max);
        let chunk = (self.next, n);
        // cannot overflow: lba_chunks checked start + count
        self.next = self.next.wrapping_add(n);
        self.remaining -= n;
        Some(chunk)
    }
}

/// Split `count` sectors starting at `start` for `op`
///
/// Fails if the range runs past the 32-bit sector space.
pub fn lba_chunks(op: LbaOperation, start: u32, count: u32) -> Result<LbaChunks> {
    if u64::from(start) + u64::from(count) > 1u64 << 32 {
        return Err(Error::InvalidArgument(format!(
            "sector range 0x{:08x}+{} exceeds 32-bit LBA space",
            start, count
        )));
    }
    Ok(LbaChunks {
        next: start,
        remaining: count,
        max: op.max_chunk(count),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_laws(op: LbaOperation, start: u32, count: u32) {
        let max = op.max_chunk(count);
        let mut expected_next = start;
        let mut sum = 0u64;
        for (sec, n) in lba_chunks(op, start, count).unwrap() {
            assert_eq!(sec, expected_next, "gap or overlap at {}", sec);
            assert!(n > 0 && n <= max);
            expected_next = expected_next.wrapping_add(n);
            sum += u64::from(n);
        }
        assert_eq!(sum, u64::from(count));
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(LbaOperation::Read.max_chunk(1), 128);
        assert_eq!(LbaOperation::Read.max_chunk(65536), 128);
        assert_eq!(LbaOperation::Read.max_chunk(65537), 16384);
        assert_eq!(LbaOperation::Write.max_chunk(1_000_000), 16384);
        assert_eq!(LbaOperation::Erase.max_chunk(65536), 128);
        assert_eq!(LbaOperation::Erase.max_chunk(65537), 32768);
    }

    #[test]
    fn test_chunking_laws() {
        let counts = [
            0, 1, 127, 128, 129, 1000, 65535, 65536, 65537, 100_000, 1_048_576,
        ];
        for op in [LbaOperation::Read, LbaOperation::Write, LbaOperation::Erase] {
            for &count in &counts {
                check_laws(op, 0, count);
                check_laws(op, 0x1234, count);
            }
        }
    }

    #[test]
    fn test_chunk_sequence() {
        let chunks: Vec<_> = lba_chunks(LbaOperation::Read, 10, 300).unwrap().collect();
        assert_eq!(chunks, vec![(10, 128), (138, 128), (266, 44)]);

        let chunks: Vec<_> = lba_chunks(LbaOperation::Erase, 0, 70000).unwrap().collect();
        assert_eq!(chunks, vec![(0, 32768), (32768, 32768), (65536, 4464)]);
    }

    #[test]
    fn test_range_at_top_of_lba_space() {
        let chunks: Vec<_> = lba_chunks(LbaOperation::Read, u32::MAX, 1)
            .unwrap()
            .collect();
        assert_eq!(chunks, vec![(u32::MAX, 1)]);
        assert!(lba_chunks(LbaOperation::Read, u32::MAX, 2).is_err());
        assert!(lba_chunks(LbaOperation::Write, 0xfff0_0001, 1).is_ok());
    }

    #[test]
    fn test_empty_range() {
        assert_eq!(lba_chunks(LbaOperation::Erase, 5, 0).unwrap().count(), 0);
    }
}
