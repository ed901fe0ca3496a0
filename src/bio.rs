use crate::{
    block::BlockDevice,
    constants::{EINVAL, EIO, ENOMEM},
    page::Page,
    prelude::*,
    swap_info::SwapInfo,
    waiter::IoWaiter,
    writeback::WritebackControl,
};
use bitflags::bitflags;
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReqOp {
    Read,
    Write,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReqFlags: u32 {
        /// Swap traffic. Drivers may treat it as memory reclaim.
        const SWAP = 1 << 0;
        /// Someone is waiting on the result.
        const SYNC = 1 << 1;
        /// Completion is going to be polled for.
        const HIPRI = 1 << 2;
        const BACKGROUND = 1 << 3;
    }
}

/// Completion callback, called exactly once with the finished request.
pub type BioEndIo = fn(Box<SwapBio>);

/// A single page swap transfer.
///
/// Owning a `SwapBio` means owing it a completion: whoever holds the box
/// last must hand it to [`SwapBio::complete`]. Dropping the request gives
/// its slot back to the device.
pub struct SwapBio {
    op: ReqOp,
    flags: ReqFlags,
    /// First 512 byte sector on `bdev`.
    sector: u64,
    page: Arc<Page>,
    bdev: Arc<BlockDevice>,
    sis: Arc<SwapInfo>,
    end_io: BioEndIo,
    waiter: Option<Arc<IoWaiter>>,
    status: KResult<()>,
    ioprio: u16,
    cgroup: Option<u32>,
}

impl SwapBio {
    /// Build a request moving `page` to or from its slot on `sis`.
    ///
    /// # Errors
    /// `EINVAL` if the page is larger than the device takes in one request.
    /// `ENOMEM` if the device has no free request slot. The page isn't
    /// touched in either case.
    pub(crate) fn alloc(
        op: ReqOp,
        sis: &Arc<SwapInfo>,
        page: &Arc<Page>,
        end_io: BioEndIo,
    ) -> KResult<Box<Self>> {
        let bdev = sis.bdev().cloned().ok_or(EIO)?;
        let sector = sis.page_sector(page)?;

        if page.nr_pages() as u64 > bdev.max_pages() {
            return Err(EINVAL);
        }

        if !bdev.reserve_tag() {
            return Err(ENOMEM);
        }

        Ok(Box::new(Self {
            op,
            flags: ReqFlags::SWAP,
            sector,
            page: page.clone(),
            bdev,
            sis: sis.clone(),
            end_io,
            waiter: None,
            status: Ok(()),
            ioprio: 0,
            cgroup: None,
        }))
    }

    pub(crate) fn add_flags(&mut self, flags: ReqFlags) {
        self.flags |= flags;
    }

    pub(crate) fn associate(&mut self, wbc: &WritebackControl) {
        self.flags |= wbc.write_flags();
        self.ioprio = wbc.ioprio();
        self.cgroup = wbc.cgroup;
    }

    pub(crate) fn set_waiter(&mut self, waiter: Arc<IoWaiter>) {
        self.waiter = Some(waiter);
    }

    pub(crate) fn take_waiter(&mut self) -> Option<Arc<IoWaiter>> {
        self.waiter.take()
    }

    /// Finish the request with `status` and run its completion.
    pub fn complete(mut self: Box<Self>, status: KResult<()>) {
        self.status = status;
        (self.end_io)(self)
    }

    pub fn op(&self) -> ReqOp {
        self.op
    }

    pub fn flags(&self) -> ReqFlags {
        self.flags
    }

    pub fn sector(&self) -> u64 {
        self.sector
    }

    /// Bytes to transfer.
    pub fn len(&self) -> usize {
        self.page.len()
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    pub fn bdev(&self) -> &Arc<BlockDevice> {
        &self.bdev
    }

    pub fn sis(&self) -> &Arc<SwapInfo> {
        &self.sis
    }

    pub fn status(&self) -> KResult<()> {
        self.status
    }

    pub fn ioprio(&self) -> u16 {
        self.ioprio
    }

    pub fn cgroup(&self) -> Option<u32> {
        self.cgroup
    }
}

impl Drop for SwapBio {
    fn drop(&mut self) {
        self.bdev.release_tag();
    }
}

impl fmt::Debug for SwapBio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapBio")
            .field("op", &self.op)
            .field("flags", &self.flags)
            .field("sector", &self.sector)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
