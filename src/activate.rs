use crate::{
    constants::{EINVAL, PAGE_SIZE_BITS},
    extent::ExtentTable,
    page::Page,
    prelude::*,
};

/// A regular file used as swap.
pub trait SwapFile: Send + Sync {
    /// log2 of the file system block size. Never larger than a page.
    fn block_size_bits(&self) -> u32;

    /// File size in bytes.
    fn size(&self) -> u64;

    /// Device block backing file block `block`, `None` for a hole.
    fn bmap(&self, block: u64) -> Option<u64> {
        let _ = block;
        None
    }

    /// Read from byte `pos` of the file into `buf`.
    ///
    /// # Returns
    /// Bytes read.
    fn read_page(&self, pos: u64, buf: &mut [u8]) -> KResult<usize>;

    /// Write `iov` at byte `pos`, bypassing any file cache.
    ///
    /// # Returns
    /// Bytes written, possibly fewer than requested.
    fn direct_write(&self, pos: u64, iov: &[&[u8]]) -> KResult<usize>;

    /// # Returns
    /// Whether the page went from clean to dirty.
    fn set_page_dirty(&self, page: &Page) -> bool {
        page.set_dirty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    pub nr_extents: usize,
    /// Pages mapped, the header page included.
    pub max: u64,
    /// Pages usable for swapping.
    pub pages: u64,
    /// Distance in page blocks between the lowest and the highest block
    /// used, 0 if nothing but the header got mapped.
    pub span: u64,
}

/// Build the extent table of a block mapped swap file, looking at no more
/// than `max` pages.
///
/// Only runs of blocks that are page aligned on disk and contiguous for a
/// whole page are used. Anything else is skipped one file block at a time.
///
/// # Errors
/// `EINVAL` if the file has holes, or whatever building the table fails
/// with.
pub fn generic_swapfile_activate(
    file: &dyn SwapFile,
    max: u64,
) -> KResult<(ExtentTable, Activation)> {
    let blkbits = file.block_size_bits();
    assert!(blkbits <= PAGE_SIZE_BITS, "block larger than a page");

    let blocks_per_page = 1u64 << (PAGE_SIZE_BITS - blkbits);
    let last_block = file.size() >> blkbits;

    let mut table = ExtentTable::new();
    let mut nr_extents = 0;
    let mut probe_block = 0;
    let mut page_no = 0;
    let mut lowest_block = u64::MAX;
    let mut highest_block = 0;

    let bmap = |block| {
        file.bmap(block).ok_or_else(|| {
            println_err!("swapon: swapfile has holes");
            EINVAL
        })
    };

    'probe: while probe_block + blocks_per_page <= last_block && page_no < max {
        let first_block = bmap(probe_block)?;

        if first_block & (blocks_per_page - 1) != 0 {
            probe_block += 1;
            continue;
        }

        for block_in_page in 1..blocks_per_page {
            if bmap(probe_block + block_in_page)? != first_block + block_in_page {
                probe_block += 1;
                continue 'probe;
            }
        }

        let first_block = first_block >> (PAGE_SIZE_BITS - blkbits);

        // Page 0 holds the swap header.
        if page_no != 0 {
            lowest_block = lowest_block.min(first_block);
            highest_block = highest_block.max(first_block);
        }

        nr_extents += table.add(page_no, 1, first_block)?;
        page_no += 1;
        probe_block += blocks_per_page;
    }

    let span = match lowest_block {
        u64::MAX => 0,
        lowest => 1 + highest_block - lowest,
    };

    let max = page_no.max(1);
    println_trace!(
        "trace_swap",
        "swapon: {} extents, {} pages, span {}",
        nr_extents,
        max - 1,
        span
    );

    Ok((
        table,
        Activation {
            nr_extents,
            max,
            pages: max - 1,
            span,
        },
    ))
}
