//! Byte ranges: `Content-Range`/`Range` header parsing and the set of
//! ranges an upload has received so far.

use crate::services::error::{StoreError, StoreResult};
use serde::Serialize;

/// Inclusive byte range reported by a chunk upload, plus the object total.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parse `bytes start-end/total`.
pub fn parse_content_range(value: &str) -> StoreResult<ContentRange> {
    let invalid = || StoreError::InvalidContentRange(value.to_string());
    let unit = value.trim().strip_prefix("bytes ").ok_or_else(invalid)?;
    let (range, total) = unit.split_once('/').ok_or_else(invalid)?;
    let (start, end) = range.split_once('-').ok_or_else(invalid)?;

    let start: u64 = start.trim().parse().map_err(|_| invalid())?;
    let end: u64 = end.trim().parse().map_err(|_| invalid())?;
    let total: u64 = total.trim().parse().map_err(|_| invalid())?;
    if start > end || end >= total {
        return Err(invalid());
    }
    Ok(ContentRange { start, end, total })
}

/// Inclusive byte range requested by a chunk download.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// Parse `bytes=start-end`, `bytes=start-` or `bytes=-suffix` against an
/// object of `size` bytes. Open ends are clamped to the last byte; explicit
/// ends are not, so an out-of-bounds request stays detectable.
pub fn parse_range(value: &str, size: u64) -> StoreResult<ByteRange> {
    let out_of_bounds = || StoreError::RangeOutOfBounds {
        start: 0,
        end: 0,
        size,
    };
    let unit = value.trim().strip_prefix("bytes=").ok_or_else(out_of_bounds)?;
    if unit.contains(',') {
        // multipart/byteranges is not served
        return Err(out_of_bounds());
    }
    let (start, end) = unit.split_once('-').ok_or_else(out_of_bounds)?;
    let (start, end) = (start.trim(), end.trim());

    let range = match (start.is_empty(), end.is_empty()) {
        (true, true) => return Err(out_of_bounds()),
        (true, false) => {
            let suffix: u64 = end.parse().map_err(|_| out_of_bounds())?;
            if suffix == 0 || size == 0 {
                return Err(out_of_bounds());
            }
            ByteRange {
                start: size.saturating_sub(suffix),
                end: size - 1,
            }
        }
        (false, true) => {
            let start: u64 = start.parse().map_err(|_| out_of_bounds())?;
            ByteRange {
                start,
                end: size.saturating_sub(1),
            }
        }
        (false, false) => ByteRange {
            start: start.parse().map_err(|_| out_of_bounds())?,
            end: end.parse().map_err(|_| out_of_bounds())?,
        },
    };
    Ok(range)
}

/// Sorted, non-overlapping, half-open intervals of received bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CoveredRanges {
    intervals: Vec<(u64, u64)>,
}

impl CoveredRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `[start, end)`, merging with overlapping or touching intervals.
    pub fn insert(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        let (mut lo, mut hi) = (start, end);
        let mut merged = Vec::with_capacity(self.intervals.len() + 1);
        let mut placed = false;
        for &(a, b) in &self.intervals {
            if b < lo {
                merged.push((a, b));
            } else if a > hi {
                if !placed {
                    merged.push((lo, hi));
                    placed = true;
                }
                merged.push((a, b));
            } else {
                lo = lo.min(a);
                hi = hi.max(b);
            }
        }
        if !placed {
            merged.push((lo, hi));
        }
        self.intervals = merged;
    }

    /// True once a single interval spans `[0, total)`.
    pub fn covers(&self, total: u64) -> bool {
        matches!(self.intervals.as_slice(), [(0, end)] if *end >= total)
    }

    pub fn received_bytes(&self) -> u64 {
        self.intervals.iter().map(|(a, b)| b - a).sum()
    }

    /// Received ranges as inclusive `(start, end)` pairs.
    pub fn inclusive(&self) -> Vec<(u64, u64)> {
        self.intervals.iter().map(|&(a, b)| (a, b - 1)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_range() {
        let range = parse_content_range("bytes 0-4/10").unwrap();
        assert_eq!(range, ContentRange { start: 0, end: 4, total: 10 });
        assert_eq!(range.len(), 5);

        for bad in ["bytes 5-4/10", "bytes 0-10/10", "0-4/10", "bytes 0-4", "bytes a-b/c", "bytes */10"] {
            assert!(parse_content_range(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn parses_range_forms() {
        assert_eq!(parse_range("bytes=0-4", 10).unwrap(), ByteRange { start: 0, end: 4 });
        assert_eq!(parse_range("bytes=5-", 10).unwrap(), ByteRange { start: 5, end: 9 });
        assert_eq!(parse_range("bytes=-3", 10).unwrap(), ByteRange { start: 7, end: 9 });
        assert_eq!(parse_range("bytes=0-20", 10).unwrap(), ByteRange { start: 0, end: 20 });
        assert!(parse_range("bytes=0-1,3-4", 10).is_err());
        assert!(parse_range("items=0-4", 10).is_err());
        assert!(parse_range("bytes=-", 10).is_err());
    }

    #[test]
    fn covered_ranges_merge_out_of_order() {
        let mut ranges = CoveredRanges::new();
        ranges.insert(6, 10);
        assert!(!ranges.covers(10));
        ranges.insert(0, 3);
        assert_eq!(ranges.inclusive(), vec![(0, 2), (6, 9)]);
        assert_eq!(ranges.received_bytes(), 7);

        ranges.insert(2, 7);
        assert!(ranges.covers(10));
        assert_eq!(ranges.inclusive(), vec![(0, 9)]);
    }

    #[test]
    fn touching_intervals_coalesce() {
        let mut ranges = CoveredRanges::new();
        ranges.insert(0, 5);
        ranges.insert(5, 10);
        assert!(ranges.covers(10));
        ranges.insert(3, 4);
        assert_eq!(ranges.received_bytes(), 10);
    }

    #[test]
    fn last_chunk_alone_is_not_complete() {
        let mut ranges = CoveredRanges::new();
        ranges.insert(5, 10);
        assert!(!ranges.covers(10));
    }
}
