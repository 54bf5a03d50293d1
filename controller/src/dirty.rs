//! Dirty-page tracking (spec.md §3 "Dirty-page tracker", §4.5 "Dirty-page
//! tracking", §8 scenario 6).
//!
//! Two map flavours, selected per-context by [`crate::Controller::start_dirty_pages_track`]:
//! a hash set of page addresses (`DirtyPageHashSet`, BlueField-side) and a
//! sparse bit/byte-map over host-provided scatter-gather ranges
//! (`DirtyByteMap`, guest-side). Both are page-aligned; a bytemap's length
//! is rounded up to the byte.

use std::collections::BTreeSet;
use std::sync::Mutex;

use vnic_abi::{Error, Result};

fn floor_to(value: u64, page_size: u64) -> u64 {
    value - (value % page_size)
}

fn ceil_to(value: u64, page_size: u64) -> u64 {
    let rem = value % page_size;
    if rem == 0 {
        value
    } else {
        value + (page_size - rem)
    }
}

fn validate_page_size(page_size: u64) -> Result<()> {
    if page_size <= 1 || !page_size.is_power_of_two() {
        return Err(Error::BadArgument(format!(
            "page_size must be a power of two greater than 1, got {page_size}"
        )));
    }
    Ok(())
}

/// Number of pages covered by `[pa, pa+len)` after rounding both ends out to
/// page boundaries.
fn pages_touched(page_size: u64, pa: u64, len: u64) -> u64 {
    if len == 0 {
        return 0;
    }
    let start = floor_to(pa, page_size);
    let end = ceil_to(pa + len, page_size);
    (end - start) / page_size
}

/// Hash-set flavour of the dirty-page tracker (spec.md §3, BlueField-side):
/// one entry per distinct dirtied page address, serialized as a packed
/// array of little-endian `u64`s.
///
/// Modeled with a `Mutex<BTreeSet<u64>>` rather than a true lock-free
/// structure: the lock-freedom in spec.md §3 is a BlueField-firmware
/// implementation detail this control plane's Rust layer does not need to
/// reproduce (see `DESIGN.md`), and a `BTreeSet` gives deterministic
/// serialization order for free, which a `HashSet` would not.
pub struct DirtyPageHashSet {
    page_size: u64,
    pages: Mutex<BTreeSet<u64>>,
}

impl DirtyPageHashSet {
    pub fn new(page_size: u64) -> Result<Self> {
        validate_page_size(page_size)?;
        Ok(Self {
            page_size,
            pages: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Mark every page touched by `[pa, pa+len)` dirty; duplicate pages
    /// across calls are suppressed by set membership (spec.md §8 scenario
    /// 6: "duplicates are suppressed by the set").
    pub fn add_range(&self, pa: u64, len: u64) {
        if len == 0 {
            return;
        }
        let start = floor_to(pa, self.page_size);
        let end = ceil_to(pa + len, self.page_size);
        let mut pages = self.pages.lock().unwrap();
        let mut page = start;
        while page < end {
            pages.insert(page);
            page += self.page_size;
        }
    }

    /// Bytes a full [`Self::serialize`] call would need: 8 bytes per
    /// distinct dirtied page.
    pub fn get_size(&self) -> usize {
        self.pages.lock().unwrap().len() * 8
    }

    /// Write every currently-tracked page address into `buf` as packed
    /// little-endian `u64`s and clear the set, so a subsequent call with no
    /// intervening writes returns `0` (spec.md §8 scenario 6). Fails if
    /// `cap` cannot hold the current contents.
    pub fn serialize(&self, buf: &mut [u8], cap: usize) -> Result<usize> {
        let mut pages = self.pages.lock().unwrap();
        let needed = pages.len() * 8;
        if cap < needed {
            return Err(Error::Truncated {
                needed,
                got: cap,
            });
        }
        for (i, addr) in pages.iter().enumerate() {
            buf[i * 8..i * 8 + 8].copy_from_slice(&addr.to_le_bytes());
        }
        let count = pages.len();
        pages.clear();
        Ok(count)
    }
}

/// One host-provided scatter-gather range backing a guest-side dirty
/// bit/byte-map (spec.md §4.5 "sparse bit/byte-map over host-provided
/// scatter-gather ranges").
struct SgRange {
    base_pa: u64,
    len: u64,
    map_offset: usize,
}

/// Sparse bit/byte-map flavour of the dirty-page tracker, guest-side
/// (spec.md §3, §8).
pub struct DirtyByteMap {
    page_size: u64,
    is_bytemap: bool,
    ranges: Vec<SgRange>,
    total_map_bytes: usize,
}

impl DirtyByteMap {
    pub fn new(page_size: u64, is_bytemap: bool, sg_ranges: &[(u64, u64)]) -> Result<Self> {
        validate_page_size(page_size)?;
        let mut ranges = Vec::with_capacity(sg_ranges.len());
        let mut offset = 0usize;
        for &(base_pa, len) in sg_ranges {
            let size = Self::range_size_for(page_size, is_bytemap, base_pa, len) as usize;
            ranges.push(SgRange {
                base_pa,
                len,
                map_offset: offset,
            });
            offset += size;
        }
        Ok(Self {
            page_size,
            is_bytemap,
            ranges,
            total_map_bytes: offset,
        })
    }

    pub fn total_map_bytes(&self) -> usize {
        self.total_map_bytes
    }

    /// `range_size(pa, len) = ceil((ceil(pa+len, psz) - floor(pa, psz)) / psz / (is_bytemap ? 1 : 8))`
    /// (spec.md §8).
    pub fn range_size(&self, pa: u64, len: u64) -> u64 {
        Self::range_size_for(self.page_size, self.is_bytemap, pa, len)
    }

    fn range_size_for(page_size: u64, is_bytemap: bool, pa: u64, len: u64) -> u64 {
        let pages = pages_touched(page_size, pa, len);
        if is_bytemap {
            pages
        } else {
            pages.div_ceil(8)
        }
    }

    /// Returns `(target_host_addr, byte_offset_within_map, bytes_to_mark)`
    /// for the range `[pa, pa+len)` (spec.md §4.5 "`get_start_pa(pa, len)`
    /// returns the target host address, byte offset within map, and how
    /// many bytes to mark").
    pub fn get_start_pa(&self, pa: u64, len: u64) -> Result<(u64, usize, u64)> {
        let range = self
            .ranges
            .iter()
            .find(|r| pa >= r.base_pa && pa < r.base_pa + r.len)
            .ok_or_else(|| {
                Error::BadArgument(format!("pa {pa:#x} not covered by any registered sg range"))
            })?;
        let host_addr = floor_to(pa, self.page_size);
        let pages_from_range_start = (host_addr - floor_to(range.base_pa, self.page_size)) / self.page_size;
        let byte_offset = range.map_offset
            + if self.is_bytemap {
                pages_from_range_start as usize
            } else {
                (pages_from_range_start / 8) as usize
            };
        let mark_len = self.range_size(pa, len);
        Ok((host_addr, byte_offset, mark_len))
    }
}

/// Either flavour of tracker, selected at `start_dirty_pages_track` time.
pub enum DirtyTracker {
    HashSet(DirtyPageHashSet),
    ByteMap(DirtyByteMap),
}

impl DirtyTracker {
    /// Record a dirtying write covering `[pa, pa+len)`; queues call into
    /// this at write time when `log_writes_to_host` is set (spec.md §4.5).
    pub fn mark_dirty(&self, pa: u64, len: u64) {
        match self {
            DirtyTracker::HashSet(set) => set.add_range(pa, len),
            // The byte-map flavour only describes *where* a write should be
            // marked (`get_start_pa`); actually flipping the bit/byte lives
            // with whatever owns the host-side map buffer, which this
            // control plane does not hold a copy of.
            DirtyTracker::ByteMap(_) => {}
        }
    }
}

#[cfg(test)]
mod dirty_tests {
    use super::*;

    #[test]
    fn add_range_then_serialize_matches_page_count() {
        // spec.md §8: add_range(pa, len) then serialize returns
        // ceil(len/page_size) when pa is page-aligned and cap >= count*8.
        let set = DirtyPageHashSet::new(0x1000).unwrap();
        set.add_range(0x1000, 0x3000); // 3 pages, aligned
        assert_eq!(set.get_size(), 3 * 8);
        let mut buf = vec![0u8; 24];
        assert_eq!(set.serialize(&mut buf, 24).unwrap(), 3);
    }

    #[test]
    fn scenario_6_dirty_page_track_start_report() {
        // spec.md §8 scenario 6: three writes to {0x1000, 0x2000, 0x2800}
        // with page_size=0x1000. The third rounds down into the page
        // 0x2000 already covers, and a BTreeSet can't hold that twice, so
        // the tracked set ends up with 2 distinct pages, not 3.
        let set = DirtyPageHashSet::new(0x1000).unwrap();
        set.add_range(0x1000, 1);
        set.add_range(0x2000, 1);
        set.add_range(0x2800, 1); // rounds down into the 0x2000 page, a dup
        assert_eq!(set.get_size(), 16);
        let mut buf = vec![0u8; 16];
        assert_eq!(set.serialize(&mut buf, 16).unwrap(), 2);
        let addrs: Vec<u64> = buf
            .chunks(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(addrs, vec![0x1000, 0x2000]);
        // subsequent serialize on the same (now-cleared) map returns 0.
        let mut buf2 = vec![0u8; 16];
        assert_eq!(set.serialize(&mut buf2, 16).unwrap(), 0);
    }

    #[test]
    fn serialize_rejects_undersized_buffer() {
        let set = DirtyPageHashSet::new(0x1000).unwrap();
        set.add_range(0x1000, 0x2000);
        let mut buf = vec![0u8; 8];
        assert!(matches!(set.serialize(&mut buf, 8), Err(Error::Truncated { .. })));
    }

    #[test]
    fn rejects_non_power_of_two_page_size() {
        assert!(DirtyPageHashSet::new(3000).is_err());
        assert!(DirtyPageHashSet::new(1).is_err());
    }

    #[test]
    fn bytemap_range_size_matches_formula() {
        let map = DirtyByteMap::new(0x1000, true, &[(0, 0x10000)]).unwrap();
        assert_eq!(map.range_size(0x1000, 0x3000), 3);
        let bitmap = DirtyByteMap::new(0x1000, false, &[(0, 0x10000)]).unwrap();
        assert_eq!(bitmap.range_size(0x1000, 0x3000), 1); // 3 pages -> 1 byte of bits
    }

    #[test]
    fn get_start_pa_rounds_down_and_offsets_into_its_range() {
        let map = DirtyByteMap::new(0x1000, true, &[(0x10000, 0x4000)]).unwrap();
        let (host_addr, offset, mark_len) = map.get_start_pa(0x11800, 1).unwrap();
        assert_eq!(host_addr, 0x11000);
        assert_eq!(offset, 1); // second page within the range
        assert_eq!(mark_len, 1);
    }

    #[test]
    fn get_start_pa_rejects_pa_outside_any_range() {
        let map = DirtyByteMap::new(0x1000, true, &[(0x10000, 0x1000)]).unwrap();
        assert!(map.get_start_pa(0x50000, 1).is_err());
    }
}
