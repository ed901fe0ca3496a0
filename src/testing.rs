use crate::{
    activate::SwapFile,
    bio::{ReqFlags, ReqOp, SwapBio},
    block::{make_device, BlockDevice, BlockRequestQueue, QueueCookie},
    constants::{
        DEFAULT_QUEUE_DEPTH, EIO, EOPNOTSUPP, PAGE_SIZE, PAGE_SIZE_BITS, SECTORS_PER_PAGE_SHIFT,
        SECTOR_SHIFT,
    },
    frontswap::Frontswap,
    page::Page,
    prelude::*,
    psi::MemStall,
    slots::SwapMap,
    swap_info::{SwapArea, SwapBacking, SwapInfo},
};
use alloc::{collections::BTreeMap, string::String, task::Wake};
use core::{
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    task::Waker,
};
use eonix_log::ConsoleWrite;
use eonix_sync::{Relax, Spin};
use std::{sync::Once, thread};

#[derive(Debug)]
pub struct YieldRelax;

impl Relax for YieldRelax {
    fn relax() {
        thread::yield_now();
    }
}

static CAPTURED: Spin<String> = Spin::new(String::new());

struct CaptureConsole;

impl ConsoleWrite for CaptureConsole {
    fn write(&self, s: &str) {
        CAPTURED.lock().push_str(s);
    }
}

pub fn capture_console() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| eonix_log::set_console(Arc::new(CaptureConsole)));
}

pub fn console_contains(needle: &str) -> bool {
    capture_console();
    CAPTURED.lock().contains(needle)
}

pub struct CountingWaker {
    count: AtomicUsize,
}

impl CountingWaker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            count: AtomicUsize::new(0),
        })
    }

    pub fn waker(self: &Arc<Self>) -> Waker {
        Waker::from(self.clone())
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn refs(self: &Arc<Self>) -> usize {
        Arc::strong_count(self)
    }
}

impl Wake for CountingWaker {
    fn wake(self: Arc<Self>) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Default)]
pub struct CountingMemStall {
    entered: AtomicUsize,
    active: AtomicUsize,
}

impl CountingMemStall {
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::Acquire)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl MemStall for CountingMemStall {
    fn enter(&self) -> u64 {
        self.entered.fetch_add(1, Ordering::AcqRel);
        self.active.fetch_add(1, Ordering::AcqRel) as u64
    }

    fn leave(&self, _: u64) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    /// Complete inside `submit`.
    Immediate,
    /// Complete on `complete_all`.
    Deferred,
    /// Complete on `complete_all` or `poll`.
    PollOnly,
    /// Complete on `complete_all` or once `poll` has been called this often.
    PollAfter(usize),
}

#[derive(Default)]
struct RamQueueStats {
    reads: usize,
    writes: usize,
    rw_pages: usize,
    polls: usize,
    completions: usize,
    last_flags: Option<ReqFlags>,
    last_len: Option<usize>,
    freed: Vec<u64>,
}

/// A RAM disk.
pub struct RamQueue {
    pages: usize,
    completion: Completion,
    data: Spin<Vec<u8>>,
    pending: Spin<Vec<Box<SwapBio>>>,
    stats: Spin<RamQueueStats>,
    depth: AtomicUsize,
    max_pages: AtomicU64,
    next_cookie: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    rw_page: AtomicBool,
    slot_free_notify: AtomicBool,
}

impl RamQueue {
    fn with_completion(pages: usize, completion: Completion) -> Arc<Self> {
        Arc::new(Self {
            pages,
            completion,
            data: Spin::new(vec![0; pages * PAGE_SIZE]),
            pending: Spin::new(Vec::new()),
            stats: Spin::new(RamQueueStats::default()),
            depth: AtomicUsize::new(DEFAULT_QUEUE_DEPTH),
            max_pages: AtomicU64::new(1024),
            next_cookie: AtomicU64::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            rw_page: AtomicBool::new(false),
            slot_free_notify: AtomicBool::new(false),
        })
    }

    pub fn new(pages: usize) -> Arc<Self> {
        Self::with_completion(pages, Completion::Immediate)
    }

    pub fn deferred(pages: usize) -> Arc<Self> {
        Self::with_completion(pages, Completion::Deferred)
    }

    pub fn poll_only(pages: usize) -> Arc<Self> {
        Self::with_completion(pages, Completion::PollOnly)
    }

    /// Requests complete on the `polls`th poll.
    pub fn poll_after(pages: usize, polls: usize) -> Arc<Self> {
        Self::with_completion(pages, Completion::PollAfter(polls))
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn set_depth(&self, depth: usize) {
        self.depth.store(depth, Ordering::Release);
    }

    pub fn set_max_pages(&self, pages: u64) {
        self.max_pages.store(pages, Ordering::Release);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Release);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    pub fn enable_rw_page(&self) {
        self.rw_page.store(true, Ordering::Release);
    }

    pub fn enable_slot_free_notify(&self) {
        self.slot_free_notify.store(true, Ordering::Release);
    }

    pub fn reads(&self) -> usize {
        self.stats.lock().reads
    }

    pub fn writes(&self) -> usize {
        self.stats.lock().writes
    }

    pub fn rw_pages(&self) -> usize {
        self.stats.lock().rw_pages
    }

    pub fn polls(&self) -> usize {
        self.stats.lock().polls
    }

    pub fn completions(&self) -> usize {
        self.stats.lock().completions
    }

    pub fn last_flags(&self) -> Option<ReqFlags> {
        self.stats.lock().last_flags
    }

    pub fn last_len(&self) -> Option<usize> {
        self.stats.lock().last_len
    }

    pub fn freed_slots(&self) -> Vec<u64> {
        self.stats.lock().freed.clone()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn failing(&self, op: ReqOp) -> bool {
        match op {
            ReqOp::Read => self.fail_reads.load(Ordering::Acquire),
            ReqOp::Write => self.fail_writes.load(Ordering::Acquire),
        }
    }

    fn transfer(&self, sector: u64, page: &Page, op: ReqOp) -> KResult<()> {
        if self.failing(op) {
            return Err(EIO);
        }

        let start = (sector << SECTOR_SHIFT) as usize;
        let end = start + page.len();

        let mut disk = self.data.lock();
        let disk = disk.get_mut(start..end).ok_or(EIO)?;
        let mut data = page.data();

        match op {
            ReqOp::Read => data.copy_from_slice(disk),
            ReqOp::Write => disk.copy_from_slice(&data),
        }

        Ok(())
    }

    fn finish(&self, bio: Box<SwapBio>) {
        let status = self.transfer(bio.sector(), bio.page(), bio.op());
        self.stats.lock().completions += 1;
        bio.complete(status);
    }

    /// Complete every queued request.
    ///
    /// # Returns
    /// Whether there was anything to complete.
    pub fn complete_all(&self) -> bool {
        let pending = core::mem::take(&mut *self.pending.lock());
        let any = !pending.is_empty();

        for bio in pending {
            self.finish(bio);
        }

        any
    }
}

impl BlockRequestQueue for RamQueue {
    fn max_request_pages(&self) -> u64 {
        self.max_pages.load(Ordering::Acquire)
    }

    fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    fn submit(&self, bio: Box<SwapBio>) -> QueueCookie {
        {
            let mut stats = self.stats.lock();
            match bio.op() {
                ReqOp::Read => stats.reads += 1,
                ReqOp::Write => stats.writes += 1,
            }
            stats.last_flags = Some(bio.flags());
            stats.last_len = Some(bio.len());
        }

        let cookie = QueueCookie(self.next_cookie.fetch_add(1, Ordering::AcqRel));
        match self.completion {
            Completion::Immediate => self.finish(bio),
            Completion::Deferred | Completion::PollOnly | Completion::PollAfter(_) => {
                self.pending.lock().push(bio)
            }
        }

        cookie
    }

    fn poll(&self, _: QueueCookie, _: bool) -> bool {
        let polls = {
            let mut stats = self.stats.lock();
            stats.polls += 1;
            stats.polls
        };

        match self.completion {
            Completion::PollOnly => self.complete_all(),
            Completion::PollAfter(after) if polls >= after => self.complete_all(),
            _ => false,
        }
    }

    fn rw_page(&self, sector: u64, page: &Page, op: ReqOp) -> KResult<()> {
        if !self.rw_page.load(Ordering::Acquire) {
            return Err(EOPNOTSUPP);
        }

        self.transfer(sector, page, op)?;
        self.stats.lock().rw_pages += 1;
        Ok(())
    }

    fn has_slot_free_notify(&self) -> bool {
        self.slot_free_notify.load(Ordering::Acquire)
    }

    fn swap_slot_free_notify(&self, offset: u64) {
        self.stats.lock().freed.push(offset);
    }
}

struct MemSwapFileState {
    data: Vec<u8>,
    short_write: Option<usize>,
    fail: bool,
    dirtied: usize,
}

/// A swap file in memory. File block `n` sits on device block `map[n]`.
pub struct MemSwapFile {
    block_bits: u32,
    map: Vec<Option<u64>>,
    state: Spin<MemSwapFileState>,
}

impl MemSwapFile {
    pub fn with_map(block_bits: u32, map: Vec<Option<u64>>) -> Arc<Self> {
        let size = map.len() << block_bits;
        Arc::new(Self {
            block_bits,
            map,
            state: Spin::new(MemSwapFileState {
                data: vec![0; size],
                short_write: None,
                fail: false,
                dirtied: 0,
            }),
        })
    }

    pub fn with_blocks(block_bits: u32, blocks: &[u64]) -> Arc<Self> {
        Self::with_map(block_bits, blocks.iter().copied().map(Some).collect())
    }

    /// A contiguous file of `size` bytes.
    pub fn with_size(size: usize) -> Arc<Self> {
        let blocks: Vec<_> = (0..(size / PAGE_SIZE) as u64).collect();
        Self::with_blocks(PAGE_SIZE_BITS, &blocks)
    }

    /// Make every following write stop after `bytes`.
    pub fn short_write(&self, bytes: usize) {
        self.state.lock().short_write = Some(bytes);
    }

    pub fn fail_io(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    pub fn bytes_at(&self, pos: usize, len: usize) -> Vec<u8> {
        self.state.lock().data[pos..pos + len].to_vec()
    }

    pub fn dirtied(&self) -> usize {
        self.state.lock().dirtied
    }
}

impl SwapFile for MemSwapFile {
    fn block_size_bits(&self) -> u32 {
        self.block_bits
    }

    fn size(&self) -> u64 {
        (self.map.len() << self.block_bits) as u64
    }

    fn bmap(&self, block: u64) -> Option<u64> {
        self.map.get(block as usize).copied().flatten()
    }

    fn read_page(&self, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        let state = self.state.lock();
        if state.fail {
            return Err(EIO);
        }

        let src = state.data.get(pos as usize..).unwrap_or_default();
        let len = src.len().min(buf.len());
        buf[..len].copy_from_slice(&src[..len]);

        Ok(len)
    }

    fn direct_write(&self, pos: u64, iov: &[&[u8]]) -> KResult<usize> {
        let mut state = self.state.lock();
        if state.fail {
            return Err(EIO);
        }

        let mut limit = state.short_write.unwrap_or(usize::MAX);
        let mut pos = pos as usize;
        let mut written = 0;

        for buf in iov {
            let room = state.data.len().saturating_sub(pos);
            if room == 0 {
                break;
            }

            let len = buf.len().min(limit).min(room);
            state.data[pos..pos + len].copy_from_slice(&buf[..len]);

            pos += len;
            limit -= len;
            written += len;
        }

        Ok(written)
    }

    fn set_page_dirty(&self, page: &Page) -> bool {
        self.state.lock().dirtied += 1;
        page.set_dirty()
    }
}

pub struct TestFrontswap {
    store: bool,
    load: bool,
    stores: AtomicUsize,
    loads: AtomicUsize,
    async_loads: AtomicUsize,
}

impl TestFrontswap {
    pub fn new(store: bool, load: bool) -> Arc<Self> {
        Arc::new(Self {
            store,
            load,
            stores: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
            async_loads: AtomicUsize::new(0),
        })
    }

    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::Acquire)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }

    pub fn async_loads(&self) -> usize {
        self.async_loads.load(Ordering::Acquire)
    }

    fn load(&self, page: &Arc<Page>, counter: &AtomicUsize) -> bool {
        if !self.load {
            return false;
        }

        counter.fetch_add(1, Ordering::AcqRel);
        page.set_uptodate();
        page.unlock();
        true
    }
}

impl Frontswap for TestFrontswap {
    fn try_store(&self, _: &Arc<Page>) -> bool {
        if self.store {
            self.stores.fetch_add(1, Ordering::AcqRel);
        }
        self.store
    }

    fn try_load(&self, page: &Arc<Page>) -> bool {
        self.load(page, &self.loads)
    }

    fn try_load_async(&self, page: &Arc<Page>) -> bool {
        self.load(page, &self.async_loads)
    }
}

/// Swap slot reference counts, 1 unless told otherwise.
pub struct TestSwapMap {
    counts: Spin<BTreeMap<u64, usize>>,
}

impl TestSwapMap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counts: Spin::new(BTreeMap::new()),
        })
    }

    pub fn set_count(&self, offset: u64, count: usize) {
        self.counts.lock().insert(offset, count);
    }
}

impl SwapMap for TestSwapMap {
    fn swap_count(&self, offset: u64) -> usize {
        self.counts.lock().get(&offset).copied().unwrap_or(1)
    }

    fn try_to_free_swap(&self, page: &Page) -> bool {
        let Some(entry) = page.swap_entry() else {
            return false;
        };

        if self.swap_count(entry.offset()) != 0 {
            return false;
        }

        page.delete_from_swap_cache();
        page.set_dirty();
        true
    }
}

pub fn blkdev_swap_info_with_map(
    swap_type: u32,
    queue: Arc<RamQueue>,
    swap_map: Arc<TestSwapMap>,
) -> Arc<SwapInfo> {
    let size = (queue.pages() as u64) << SECTORS_PER_PAGE_SHIFT;
    let bdev = BlockDevice::new(make_device(8, swap_type), size, queue);

    let area = SwapArea {
        swap_type,
        backing: SwapBacking::BlockDevice(bdev),
        swap_map,
    };

    Arc::new(SwapInfo::activate(area, u64::MAX).unwrap())
}

pub fn blkdev_swap_info(swap_type: u32, queue: Arc<RamQueue>) -> Arc<SwapInfo> {
    blkdev_swap_info_with_map(swap_type, queue, TestSwapMap::new())
}
