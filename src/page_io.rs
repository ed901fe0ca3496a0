use crate::{
    bio::{BioEndIo, ReqFlags, ReqOp, SwapBio},
    constants::{EEXIST, EINVAL, EIO, ENOENT, MAX_SWAPFILES, PAGE_SIZE_BITS},
    end_io::{end_swap_bio_read, end_swap_bio_write, swap_slot_free_notify},
    frontswap::Frontswap,
    page::Page,
    prelude::*,
    psi::{MemStall, MemStallGuard},
    stats::{count_swpout, SwapEvent, SwapMetric, SwapStats},
    swap_info::{SwapArea, SwapInfo},
    waiter::{wait_for_bio, IoWaiter},
    writeback::WritebackControl,
};
use alloc::collections::btree_map::{BTreeMap, Entry};
use core::{marker::PhantomData, task::Waker};
use eonix_sync::{Parker, Relax, Spin, SpinRelax};

/// Moves pages between memory and the active swap areas.
///
/// Pages enter every entry point locked. The page lock is the only thing
/// serializing work on a page; different pages never wait on each other
/// here. `R` is how a synchronous reader waits for its request.
pub struct SwapIo<R = SpinRelax> {
    frontswap: Option<Arc<dyn Frontswap>>,
    stats: Arc<dyn SwapStats>,
    memstall: Arc<dyn MemStall>,
    areas: Spin<BTreeMap<u32, Arc<SwapInfo>>>,
    _relax: PhantomData<R>,
}

impl<R> SwapIo<R>
where
    R: Relax + Send + Sync + 'static,
{
    pub fn new(stats: Arc<dyn SwapStats>, memstall: Arc<dyn MemStall>) -> Self {
        Self {
            frontswap: None,
            stats,
            memstall,
            areas: Spin::new(BTreeMap::new()),
            _relax: PhantomData,
        }
    }

    pub fn with_frontswap(mut self, frontswap: Arc<dyn Frontswap>) -> Self {
        self.frontswap = Some(frontswap);
        self
    }

    /// Activate `area` with at most `max_pages` pages and make it available
    /// for I/O.
    ///
    /// # Errors
    /// `EINVAL` if the area type doesn't fit in a swap entry or activation
    /// fails. `EEXIST` if the type is taken.
    pub fn swapon(&self, area: SwapArea, max_pages: u64) -> KResult<Arc<SwapInfo>> {
        let swap_type = area.swap_type;
        if swap_type >= MAX_SWAPFILES {
            return Err(EINVAL);
        }

        if self.areas.lock().contains_key(&swap_type) {
            return Err(EEXIST);
        }

        let sis = Arc::new(SwapInfo::activate(area, max_pages)?);

        match self.areas.lock().entry(swap_type) {
            Entry::Vacant(entry) => {
                entry.insert(sis.clone());
            }
            Entry::Occupied(_) => return Err(EEXIST),
        }

        println_info!(
            "Adding {}k swap on area {}. extents:{} across:{}k{}",
            sis.pages() << (PAGE_SIZE_BITS - 10),
            swap_type,
            sis.nr_extents(),
            sis.span() << (PAGE_SIZE_BITS - 10),
            if sis.is_fs() { " FS" } else { "" },
        );

        Ok(sis)
    }

    pub fn swapoff(&self, swap_type: u32) -> KResult<Arc<SwapInfo>> {
        self.areas.lock().remove(&swap_type).ok_or(ENOENT)
    }

    pub fn swap_info(&self, swap_type: u32) -> KResult<Arc<SwapInfo>> {
        self.areas.lock().get(&swap_type).cloned().ok_or(ENOENT)
    }

    /// The area holding the page's swap slot.
    pub fn page_swap_info(&self, page: &Page) -> KResult<Arc<SwapInfo>> {
        let entry = page.swap_entry().ok_or(EINVAL)?;
        self.swap_info(entry.swap_type()).map_err(|_| EINVAL)
    }

    /// Write a locked, dirty page out to swap.
    ///
    /// The page is unlocked once the write has been issued, or before
    /// returning if nothing gets issued. If the data doesn't make it to swap
    /// the page ends up dirty again.
    pub fn writepage(&self, page: &Arc<Page>, wbc: &WritebackControl) -> KResult<()> {
        assert!(page.is_locked(), "Writing out an unlocked page");

        // The dirty bit is ours now, any failure below puts it back.
        page.clear_dirty();

        let sis = match self.page_swap_info(page) {
            Ok(sis) => sis,
            Err(err) => return Self::fail_write(page, err),
        };

        if sis.swap_map().try_to_free_swap(page) {
            page.unlock();
            return Ok(());
        }

        let start = self.stats.cycles();
        if let Some(frontswap) = &self.frontswap {
            if frontswap.try_store(page) {
                page.set_writeback();
                page.unlock();
                page.end_writeback();

                let end = self.stats.cycles();
                self.stats
                    .accumulate(SwapMetric::SwapOutLatency, end.wrapping_sub(start));
                return Ok(());
            }
        }

        self.do_write(&sis, page, wbc, end_swap_bio_write)
    }

    /// Write a locked page to its slot on the device or file, skipping the
    /// front store. Requests built on the way complete through `end_io`.
    pub fn write_page_to_swap(
        &self,
        page: &Arc<Page>,
        wbc: &WritebackControl,
        end_io: BioEndIo,
    ) -> KResult<()> {
        assert!(page.is_locked(), "Writing out an unlocked page");

        match self.page_swap_info(page) {
            Ok(sis) => self.do_write(&sis, page, wbc, end_io),
            Err(err) => Self::fail_write(page, err),
        }
    }

    fn fail_write(page: &Page, err: u32) -> KResult<()> {
        page.set_dirty();
        page.unlock();
        Err(err)
    }

    fn do_write(
        &self,
        sis: &Arc<SwapInfo>,
        page: &Arc<Page>,
        wbc: &WritebackControl,
        end_io: BioEndIo,
    ) -> KResult<()> {
        if let Some(file) = sis.fs_file() {
            let pos = match sis.page_file_offset(page) {
                Ok(pos) => pos,
                Err(err) => return Self::fail_write(page, err),
            };

            page.set_writeback();
            page.unlock();

            let result = {
                let data = page.data();
                file.direct_write(pos, &[&data[..]])
            };

            let ret = match result {
                Ok(written) if written == page.len() => {
                    count_swpout(self.stats.as_ref(), page);
                    Ok(())
                }
                result => {
                    // Swap over a network file system may be short of buffers
                    // for a moment. Retry later instead of failing the page.
                    file.set_page_dirty(page);
                    page.clear_reclaim();
                    println_err_ratelimited!("Write error on dio swapfile ({})", pos);
                    result.map(|_| ())
                }
            };

            page.end_writeback();
            return ret;
        }

        let Some(bdev) = sis.bdev() else {
            return Self::fail_write(page, EINVAL);
        };

        let sector = match sis.page_sector(page) {
            Ok(sector) => sector,
            Err(err) => return Self::fail_write(page, err),
        };

        page.set_writeback();
        match bdev.rw_page(sector, page, ReqOp::Write) {
            Ok(()) => {
                page.unlock();
                page.end_writeback();
                count_swpout(self.stats.as_ref(), page);
                return Ok(());
            }
            Err(_) => page.end_writeback(),
        }

        let mut bio = match SwapBio::alloc(ReqOp::Write, sis, page, end_io) {
            Ok(bio) => bio,
            Err(err) => return Self::fail_write(page, err),
        };

        bio.associate(wbc);
        count_swpout(self.stats.as_ref(), page);

        page.set_writeback();
        page.unlock();
        bdev.submit(bio);

        Ok(())
    }

    /// Read a locked, not up to date page from swap.
    ///
    /// The result shows up in the page state. Without `synchronous` the read
    /// may still be in flight on return. With it, a read through the block
    /// layer is finished before this returns, unless the front store took
    /// the page, in which case the store completes it.
    pub fn readpage(&self, page: &Arc<Page>, synchronous: bool) -> KResult<()> {
        self.do_read(page, synchronous, false)
    }

    /// Like [`SwapIo::readpage`] without waiting, letting the front store
    /// finish the load in the background.
    pub fn readpage_async(&self, page: &Arc<Page>) -> KResult<()> {
        self.do_read(page, false, true)
    }

    fn do_read(&self, page: &Arc<Page>, synchronous: bool, load_async: bool) -> KResult<()> {
        assert!(page.is_locked(), "Reading into an unlocked page");
        assert!(!page.is_uptodate(), "Reading into an up to date page");

        let sis = match self.page_swap_info(page) {
            Ok(sis) => sis,
            Err(err) => {
                page.set_read_error();
                page.unlock();
                return Err(err);
            }
        };

        if let Some(frontswap) = &self.frontswap {
            let loaded = if load_async {
                frontswap.try_load_async(page)
            } else {
                frontswap.try_load(page)
            };

            if loaded {
                return Ok(());
            }
        }

        let _stall = MemStallGuard::new(self.memstall.as_ref());

        if sis.fs_file().is_some() {
            return self.read_from_file(&sis, page);
        }

        let (bdev, sector) = match sis.bdev().ok_or(EINVAL).and_then(|bdev| {
            let sector = sis.page_sector(page)?;
            Ok((bdev.clone(), sector))
        }) {
            Ok(found) => found,
            Err(err) => {
                page.set_read_error();
                page.unlock();
                return Err(err);
            }
        };

        page.start_read();
        if bdev.rw_page(sector, page, ReqOp::Read).is_ok() {
            page.set_uptodate();
            page.end_read();
            page.unlock();

            if page.try_lock() {
                swap_slot_free_notify(&sis, page);
                page.unlock();
            }

            self.stats.record(SwapEvent::PswpIn);
            return Ok(());
        }
        page.end_read();

        let mut bio = match SwapBio::alloc(ReqOp::Read, &sis, page, end_swap_bio_read) {
            Ok(bio) => bio,
            Err(err) => {
                page.unlock();
                return Err(err);
            }
        };

        let parker = synchronous.then(|| {
            let parker = Arc::new(Parker::<R>::new());
            let waiter = IoWaiter::new(Waker::from(parker.clone()));

            bio.add_flags(ReqFlags::HIPRI);
            bio.set_waiter(waiter.clone());
            (parker, waiter)
        });

        self.stats.record(SwapEvent::PswpIn);
        page.start_read();
        let cookie = bdev.submit(bio);

        if let Some((parker, waiter)) = parker {
            wait_for_bio(&parker, &waiter, &bdev, cookie);
        }

        Ok(())
    }

    fn read_from_file(&self, sis: &SwapInfo, page: &Page) -> KResult<()> {
        let ret = match (sis.fs_file(), sis.page_file_offset(page)) {
            (Some(file), Ok(pos)) => {
                page.start_read();
                let result = {
                    let mut data = page.data();
                    file.read_page(pos, &mut data[..])
                };
                page.end_read();

                match result {
                    Ok(read) if read == page.len() => Ok(()),
                    Ok(_) => Err(EIO),
                    Err(err) => Err(err),
                }
            }
            (None, _) => Err(EINVAL),
            (_, Err(err)) => Err(err),
        };

        match ret {
            Ok(()) => {
                page.set_uptodate();
                self.stats.record(SwapEvent::PswpIn);
            }
            Err(_) => page.set_read_error(),
        }

        page.unlock();
        ret
    }

    /// Mark a swap cache page dirty.
    ///
    /// # Returns
    /// Whether the page was clean before.
    pub fn set_page_dirty(&self, page: &Page) -> bool {
        match self
            .page_swap_info(page)
            .ok()
            .as_deref()
            .and_then(SwapInfo::fs_file)
        {
            Some(file) => file.set_page_dirty(page),
            None => page.set_dirty(),
        }
    }
}
