use crate::{
    constants::{EINVAL, ENOMEM},
    prelude::*,
};
use itertools::Itertools;

/// A run of swap pages laid out contiguously on disk.
///
/// `start_block` is counted in page sized blocks of the underlying device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapExtent {
    pub start_page: u64,
    pub nr_pages: u64,
    pub start_block: u64,
}

impl SwapExtent {
    pub fn end_page(&self) -> u64 {
        self.start_page + self.nr_pages
    }

    fn end_block(&self) -> u64 {
        self.start_block + self.nr_pages
    }

    fn contains(&self, offset: u64) -> bool {
        (self.start_page..self.end_page()).contains(&offset)
    }
}

/// Swap page offset to device block mapping, sorted by `start_page`.
#[derive(Debug, Default)]
pub struct ExtentTable {
    extents: Vec<SwapExtent>,
}

impl ExtentTable {
    pub const fn new() -> Self {
        Self {
            extents: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SwapExtent> + '_ {
        self.extents.iter()
    }

    pub fn nr_pages(&self) -> u64 {
        self.extents.iter().map(|extent| extent.nr_pages).sum()
    }

    /// Map `nr_pages` swap pages starting at `start_page` to device blocks
    /// starting at `start_block`.
    ///
    /// # Returns
    /// The number of extents created: 0 if the run was merged into the
    /// extent before it, 1 otherwise.
    ///
    /// # Errors
    /// `EINVAL` if the run is empty or overlaps an existing extent.
    /// `ENOMEM` if the table can't grow.
    pub fn add(&mut self, start_page: u64, nr_pages: u64, start_block: u64) -> KResult<usize> {
        if nr_pages == 0 {
            return Err(EINVAL);
        }

        let new = SwapExtent {
            start_page,
            nr_pages,
            start_block,
        };

        let idx = self
            .extents
            .partition_point(|extent| extent.start_page < start_page);

        if let Some(next) = self.extents.get(idx) {
            if new.end_page() > next.start_page {
                return Err(EINVAL);
            }
        }

        if let Some(prev) = idx.checked_sub(1).map(|idx| &mut self.extents[idx]) {
            if prev.end_page() > start_page {
                return Err(EINVAL);
            }

            if prev.end_page() == start_page && prev.end_block() == start_block {
                prev.nr_pages += nr_pages;
                debug_assert!(self.is_sorted());
                return Ok(0);
            }
        }

        self.extents.try_reserve(1).map_err(|_| ENOMEM)?;
        self.extents.insert(idx, new);

        debug_assert!(self.is_sorted());
        Ok(1)
    }

    pub fn find(&self, offset: u64) -> Option<&SwapExtent> {
        let idx = self
            .extents
            .partition_point(|extent| extent.end_page() <= offset);

        self.extents
            .get(idx)
            .filter(|extent| extent.contains(offset))
    }

    /// Device block holding swap page `offset`.
    pub fn map(&self, offset: u64) -> Option<u64> {
        self.find(offset)
            .map(|extent| extent.start_block + (offset - extent.start_page))
    }

    fn is_sorted(&self) -> bool {
        self.extents
            .iter()
            .tuple_windows()
            .all(|(prev, next)| prev.end_page() <= next.start_page)
    }
}
