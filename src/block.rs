use crate::{
    bio::{ReqOp, SwapBio},
    constants::{DEFAULT_QUEUE_DEPTH, EOPNOTSUPP},
    page::Page,
    prelude::*,
};
use core::{
    cmp::Ordering,
    sync::atomic::{self, AtomicUsize},
};

pub type DevId = u32;

pub fn make_device(major: u32, minor: u32) -> DevId {
    (major << 8) & 0xff00u32 | minor & 0xffu32
}

/// Handle returned by [`BlockRequestQueue::submit`] to poll for the
/// completion of that request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCookie(pub u64);

pub trait BlockRequestQueue: Send + Sync {
    /// Maximum number of pages that can be transferred in one request.
    fn max_request_pages(&self) -> u64;

    /// Requests allowed in flight at the same time.
    fn queue_depth(&self) -> usize {
        DEFAULT_QUEUE_DEPTH
    }

    /// Take over `bio`. The queue must call [`SwapBio::complete`] on it
    /// exactly once, either before returning or later from its completion
    /// context.
    fn submit(&self, bio: Box<SwapBio>) -> QueueCookie;

    /// Reap finished requests, busy waiting for a short while if `spin`.
    ///
    /// # Returns
    /// Whether any request was completed.
    fn poll(&self, cookie: QueueCookie, spin: bool) -> bool {
        let _ = (cookie, spin);
        false
    }

    /// Transfer a whole page synchronously, without going through a bio.
    /// The page data is already transferred when this returns `Ok`.
    fn rw_page(&self, sector: u64, page: &Page, op: ReqOp) -> KResult<()> {
        let _ = (sector, page, op);
        Err(EOPNOTSUPP)
    }

    /// Whether the driver wants to know about swap slots whose data has
    /// been read back and is no longer needed on the device.
    fn has_slot_free_notify(&self) -> bool {
        false
    }

    fn swap_slot_free_notify(&self, offset: u64) {
        let _ = offset;
    }

    /// Whether requests complete before [`BlockRequestQueue::submit`]
    /// returns, e.g. RAM backed devices.
    fn synchronous_io(&self) -> bool {
        false
    }
}

pub struct BlockDevice {
    devid: DevId,
    /// Size in sectors.
    size: u64,
    queue: Arc<dyn BlockRequestQueue>,
    inflight: AtomicUsize,
    depth: usize,
}

impl PartialEq for BlockDevice {
    fn eq(&self, other: &Self) -> bool {
        self.devid == other.devid
    }
}

impl PartialOrd for BlockDevice {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.devid.cmp(&other.devid))
    }
}

impl Eq for BlockDevice {}

impl Ord for BlockDevice {
    fn cmp(&self, other: &Self) -> Ordering {
        self.devid.cmp(&other.devid)
    }
}

impl BlockDevice {
    pub fn new(devid: DevId, size: u64, queue: Arc<dyn BlockRequestQueue>) -> Arc<Self> {
        let depth = queue.queue_depth();
        Arc::new(Self {
            devid,
            size,
            queue,
            inflight: AtomicUsize::new(0),
            depth,
        })
    }

    pub fn devid(&self) -> DevId {
        self.devid
    }

    pub fn major(&self) -> u32 {
        (self.devid >> 8) & 0xff
    }

    pub fn minor(&self) -> u32 {
        self.devid & 0xff
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn max_pages(&self) -> u64 {
        self.queue.max_request_pages()
    }

    pub fn queue(&self) -> &Arc<dyn BlockRequestQueue> {
        &self.queue
    }

    /// Requests currently allocated against this device.
    pub fn inflight(&self) -> usize {
        self.inflight.load(atomic::Ordering::Acquire)
    }

    /// Reserve a request slot.
    ///
    /// # Returns
    /// `false` if the queue is full.
    pub(crate) fn reserve_tag(&self) -> bool {
        self.inflight
            .fetch_update(
                atomic::Ordering::AcqRel,
                atomic::Ordering::Acquire,
                |inflight| (inflight < self.depth).then_some(inflight + 1),
            )
            .is_ok()
    }

    pub(crate) fn release_tag(&self) {
        let old = self.inflight.fetch_sub(1, atomic::Ordering::AcqRel);
        assert_ne!(old, 0, "Releasing a request slot never reserved");
    }

    pub fn submit(&self, bio: Box<SwapBio>) -> QueueCookie {
        println_trace!(
            "trace_swap",
            "block {}:{}: submit {:?} at sector {}",
            self.major(),
            self.minor(),
            bio.op(),
            bio.sector()
        );

        self.queue.submit(bio)
    }

    pub fn poll(&self, cookie: QueueCookie, spin: bool) -> bool {
        self.queue.poll(cookie, spin)
    }

    pub fn rw_page(&self, sector: u64, page: &Page, op: ReqOp) -> KResult<()> {
        self.queue.rw_page(sector, page, op)
    }

    pub fn has_slot_free_notify(&self) -> bool {
        self.queue.has_slot_free_notify()
    }

    pub fn swap_slot_free_notify(&self, offset: u64) {
        self.queue.swap_slot_free_notify(offset)
    }

    pub fn synchronous_io(&self) -> bool {
        self.queue.synchronous_io()
    }
}
