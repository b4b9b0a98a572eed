//! Space reservation inside the pool's data region.
//!
//! The allocator's bookkeeping is volatile. On open it is rebuilt from the
//! records reachable through the durable chain, so an extent reserved by an
//! allocation that never got linked is free again after a restart.

use crate::error::{PoolError, Result};
use std::collections::BTreeMap;

/// Reserves and releases byte extents inside a region.
pub trait SpaceAllocator {
    /// Reserve `size` contiguous bytes and return their offset.
    ///
    /// Fails with [`PoolError::OutOfSpace`] when no free extent fits.
    fn reserve(&mut self, size: u64) -> Result<u64>;

    /// Return the extent starting at `offset` to the free pool.
    ///
    /// Returns the extent length, or `None` if nothing was reserved there.
    fn release(&mut self, offset: u64) -> Option<u64>;

    /// Length of the reserved extent starting exactly at `offset`, if any.
    fn extent_at(&self, offset: u64) -> Option<u64>;

    /// Total free bytes.
    fn free_bytes(&self) -> u64;

    /// Total reserved bytes.
    fn used_bytes(&self) -> u64;
}

/// First-fit extent allocator with coalescing free list.
#[derive(Debug, Clone)]
pub struct ExtentAllocator {
    /// Free extents, offset to length. Never adjacent to each other.
    free: BTreeMap<u64, u64>,
    /// Reserved extents, offset to length.
    used: BTreeMap<u64, u64>,
    /// Running total of reserved bytes.
    used_bytes: u64,
    /// Running total of free bytes.
    free_bytes: u64,
}

impl ExtentAllocator {
    /// Create an allocator managing `[start, end)`, all of it free.
    pub fn new(start: u64, end: u64) -> Self {
        let mut free = BTreeMap::new();
        let len = end.saturating_sub(start);
        if len > 0 {
            free.insert(start, len);
        }
        Self {
            free,
            used: BTreeMap::new(),
            used_bytes: 0,
            free_bytes: len,
        }
    }

    /// Rebuild an allocator for `[start, end)` in which `live` extents
    /// (offset, length) are reserved and everything else is free.
    ///
    /// Fails with the offending offset if an extent lies outside the range
    /// or overlaps another one.
    pub fn from_live(
        start: u64,
        end: u64,
        live: impl IntoIterator<Item = (u64, u64)>,
    ) -> std::result::Result<Self, (u64, &'static str)> {
        let mut live: Vec<(u64, u64)> = live.into_iter().collect();
        live.sort_unstable_by_key(|&(offset, _)| offset);

        let mut allocator = Self {
            free: BTreeMap::new(),
            used: BTreeMap::new(),
            used_bytes: 0,
            free_bytes: 0,
        };

        let mut cursor = start;
        for (offset, len) in live {
            let extent_end = offset
                .checked_add(len)
                .ok_or((offset, "Extent length overflows"))?;
            if offset < start || extent_end > end {
                return Err((offset, "Extent outside the data region"));
            }
            if offset < cursor {
                return Err((offset, "Extent overlaps a previous record"));
            }
            if offset > cursor {
                allocator.free.insert(cursor, offset - cursor);
                allocator.free_bytes += offset - cursor;
            }
            allocator.used.insert(offset, len);
            allocator.used_bytes += len;
            cursor = extent_end;
        }
        if end > cursor {
            allocator.free.insert(cursor, end - cursor);
            allocator.free_bytes += end - cursor;
        }

        Ok(allocator)
    }

    /// Largest contiguous free extent.
    pub fn largest_free(&self) -> u64 {
        self.free.values().copied().max().unwrap_or(0)
    }

    /// Number of reserved extents.
    pub fn extent_count(&self) -> usize {
        self.used.len()
    }
}

impl SpaceAllocator for ExtentAllocator {
    fn reserve(&mut self, size: u64) -> Result<u64> {
        debug_assert!(size > 0, "zero-length reservation");

        let found = self
            .free
            .iter()
            .find(|&(_, &len)| len >= size)
            .map(|(&offset, &len)| (offset, len));

        let Some((offset, len)) = found else {
            return Err(PoolError::OutOfSpace {
                requested: size,
                available: self.largest_free(),
            });
        };

        self.free.remove(&offset);
        if len > size {
            self.free.insert(offset + size, len - size);
        }
        self.used.insert(offset, size);
        self.used_bytes += size;
        self.free_bytes -= size;

        Ok(offset)
    }

    fn release(&mut self, offset: u64) -> Option<u64> {
        let size = self.used.remove(&offset)?;
        self.used_bytes -= size;
        self.free_bytes += size;

        let mut start = offset;
        let mut len = size;

        // Merge with the free extent that ends where this one starts
        if let Some((&prev, &prev_len)) = self.free.range(..offset).next_back() {
            if prev + prev_len == offset {
                self.free.remove(&prev);
                start = prev;
                len += prev_len;
            }
        }

        // Merge with the free extent that starts where this one ends
        if let Some(next_len) = self.free.remove(&(offset + size)) {
            len += next_len;
        }

        self.free.insert(start, len);
        Some(size)
    }

    fn extent_at(&self, offset: u64) -> Option<u64> {
        self.used.get(&offset).copied()
    }

    fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    fn used_bytes(&self) -> u64 {
        self.used_bytes
    }
}
