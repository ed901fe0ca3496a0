use crate::{
    activate::{generic_swapfile_activate, SwapFile},
    block::BlockDevice,
    constants::{EINVAL, PAGE_SIZE_BITS, SECTORS_PER_PAGE_SHIFT},
    extent::ExtentTable,
    page::Page,
    prelude::*,
    slots::SwapMap,
};
use bitflags::bitflags;
use core::fmt;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SwapFlags: u32 {
        /// The area is a whole block device.
        const BLKDEV = 1 << 0;
        /// I/O goes through the file system instead of the block layer.
        const FS = 1 << 1;
        /// The device completes requests before `submit` returns.
        const SYNCHRONOUS_IO = 1 << 2;
    }
}

pub enum SwapBacking {
    BlockDevice(Arc<BlockDevice>),
    /// A swap file whose blocks are mapped onto `bdev` at activation.
    File {
        file: Arc<dyn SwapFile>,
        bdev: Arc<BlockDevice>,
    },
    /// A swap file only reachable through its file system.
    Fs(Arc<dyn SwapFile>),
}

/// Everything needed to bring up a swap area.
pub struct SwapArea {
    pub swap_type: u32,
    pub backing: SwapBacking,
    pub swap_map: Arc<dyn SwapMap>,
}

/// An active swap area. Nothing in here changes after activation.
pub struct SwapInfo {
    swap_type: u32,
    flags: SwapFlags,
    bdev: Option<Arc<BlockDevice>>,
    file: Option<Arc<dyn SwapFile>>,
    swap_map: Arc<dyn SwapMap>,
    extents: ExtentTable,
    nr_extents: usize,
    /// Pages mapped, the header page included.
    max: u64,
    pages: u64,
    span: u64,
}

impl SwapInfo {
    /// Map the backing store of `area`, using at most `max_pages` pages.
    ///
    /// # Errors
    /// `EINVAL` if there is no usable page besides the header or if a swap
    /// file has holes. `ENOMEM` if the extent table can't be built.
    pub fn activate(area: SwapArea, max_pages: u64) -> KResult<Self> {
        let SwapArea {
            swap_type,
            backing,
            swap_map,
        } = area;

        let (flags, bdev, file, extents, nr_extents, max, span) = match backing {
            SwapBacking::BlockDevice(bdev) => {
                let max = (bdev.size() >> SECTORS_PER_PAGE_SHIFT).min(max_pages);
                let (extents, nr_extents) = Self::linear_extents(max)?;

                let mut flags = SwapFlags::BLKDEV;
                if bdev.synchronous_io() {
                    flags |= SwapFlags::SYNCHRONOUS_IO;
                }

                (flags, Some(bdev), None, extents, nr_extents, max, max.saturating_sub(1))
            }
            SwapBacking::File { file, bdev } => {
                let (extents, activation) = generic_swapfile_activate(file.as_ref(), max_pages)?;

                let mut flags = SwapFlags::empty();
                if bdev.synchronous_io() {
                    flags |= SwapFlags::SYNCHRONOUS_IO;
                }

                (
                    flags,
                    Some(bdev),
                    Some(file),
                    extents,
                    activation.nr_extents,
                    activation.max,
                    activation.span,
                )
            }
            SwapBacking::Fs(file) => {
                let max = (file.size() >> PAGE_SIZE_BITS).min(max_pages);
                let (extents, nr_extents) = Self::linear_extents(max)?;

                (SwapFlags::FS, None, Some(file), extents, nr_extents, max, max.saturating_sub(1))
            }
        };

        let pages = max.saturating_sub(1);
        if pages == 0 {
            println_warn!("swapon: empty swap area {}", swap_type);
            return Err(EINVAL);
        }

        Ok(Self {
            swap_type,
            flags,
            bdev,
            file,
            swap_map,
            extents,
            nr_extents,
            max,
            pages,
            span,
        })
    }

    /// One extent mapping page `n` to block `n`.
    fn linear_extents(max: u64) -> KResult<(ExtentTable, usize)> {
        let mut extents = ExtentTable::new();
        let nr_extents = match max {
            0 => 0,
            max => extents.add(0, max, 0)?,
        };

        Ok((extents, nr_extents))
    }

    pub fn swap_type(&self) -> u32 {
        self.swap_type
    }

    pub fn flags(&self) -> SwapFlags {
        self.flags
    }

    pub fn is_fs(&self) -> bool {
        self.flags.contains(SwapFlags::FS)
    }

    pub fn bdev(&self) -> Option<&Arc<BlockDevice>> {
        self.bdev.as_ref()
    }

    pub fn file(&self) -> Option<&Arc<dyn SwapFile>> {
        self.file.as_ref()
    }

    /// The swap file, if I/O has to go through its file system.
    pub fn fs_file(&self) -> Option<&Arc<dyn SwapFile>> {
        self.file.as_ref().filter(|_| self.is_fs())
    }

    pub fn swap_map(&self) -> &dyn SwapMap {
        self.swap_map.as_ref()
    }

    pub fn extents(&self) -> &ExtentTable {
        &self.extents
    }

    pub fn nr_extents(&self) -> usize {
        self.nr_extents
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    /// Usable pages, the header page excluded.
    pub fn pages(&self) -> u64 {
        self.pages
    }

    pub fn span(&self) -> u64 {
        self.span
    }

    fn page_offset(&self, page: &Page) -> KResult<u64> {
        let entry = page.swap_entry().ok_or(EINVAL)?;
        if entry.swap_type() != self.swap_type {
            return Err(EINVAL);
        }

        Ok(entry.offset())
    }

    /// Page sized device block holding the page's slot.
    pub fn map_swap_page(&self, page: &Page) -> KResult<u64> {
        let offset = self.page_offset(page)?;
        self.extents.map(offset).ok_or(EINVAL)
    }

    pub fn page_sector(&self, page: &Page) -> KResult<u64> {
        Ok(self.map_swap_page(page)? << SECTORS_PER_PAGE_SHIFT)
    }

    /// Byte position of the page's slot in the swap file.
    pub fn page_file_offset(&self, page: &Page) -> KResult<u64> {
        Ok(self.page_offset(page)? << PAGE_SIZE_BITS)
    }
}

impl fmt::Debug for SwapInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapInfo")
            .field("swap_type", &self.swap_type)
            .field("flags", &self.flags)
            .field("nr_extents", &self.nr_extents)
            .field("pages", &self.pages)
            .field("span", &self.span)
            .finish_non_exhaustive()
    }
}
