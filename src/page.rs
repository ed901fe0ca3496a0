use crate::{
    constants::{MAX_SWAPFILES, MAX_SWAPFILES_SHIFT, PAGE_SIZE},
    prelude::*,
};
use bitflags::bitflags;
use core::{
    fmt,
    sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering},
};
use eonix_sync::{Spin, SpinGuard};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlag: u32 {
        /// Exclusive access, held by whoever is moving the page in or out.
        const LOCKED = 1 << 0;
        /// The page content is valid.
        const UPTODATE = 1 << 1;
        /// The last I/O on the page failed.
        const ERROR = 1 << 2;
        /// The page content must be written back before it can be dropped.
        const DIRTY = 1 << 3;
        /// Reclaim wants the page gone as soon as writeback finishes.
        const RECLAIM = 1 << 4;
        /// The page has a slot in some swap area, see [`Page::swap_entry`].
        const SWAPCACHE = 1 << 5;
    }
}

struct PageFlags(AtomicU32);

impl PageFlags {
    const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    fn load(&self) -> PageFlag {
        PageFlag::from_bits_retain(self.0.load(Ordering::Acquire))
    }

    fn has(&self, flag: PageFlag) -> bool {
        self.load().contains(flag)
    }

    /// # Returns
    /// Flags before the update.
    fn set(&self, flag: PageFlag) -> PageFlag {
        PageFlag::from_bits_retain(self.0.fetch_or(flag.bits(), Ordering::AcqRel))
    }

    /// # Returns
    /// Flags before the update.
    fn clear(&self, flag: PageFlag) -> PageFlag {
        PageFlag::from_bits_retain(self.0.fetch_and(!flag.bits(), Ordering::AcqRel))
    }

    /// Set `set` and clear `clear` in one atomic step.
    fn update(&self, set: PageFlag, clear: PageFlag) -> PageFlag {
        let old = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |flags| {
                Some((flags & !clear.bits()) | set.bits())
            })
            .unwrap_or_else(|flags| flags);

        PageFlag::from_bits_retain(old)
    }
}

/// I/O currently attached to a page. At most one of each kind can be in
/// flight and the two kinds exclude each other.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoState {
    Idle = 0,
    ReadInFlight = 1,
    WritebackInFlight = 2,
}

impl IoState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::ReadInFlight,
            2 => Self::WritebackInFlight,
            raw => unreachable!("invalid page io state {raw}"),
        }
    }
}

/// A point-in-time view of a page as the swap path sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Not locked and holding no valid content.
    Unlocked,
    /// Locked by its owner, no I/O issued yet.
    LockedPending,
    ReadInFlight,
    WritebackInFlight,
    /// Unlocked with valid content.
    Valid,
    /// The last I/O failed.
    Errored,
}

const SWP_TYPE_SHIFT: u32 = u64::BITS - MAX_SWAPFILES_SHIFT;
const SWP_OFFSET_MASK: u64 = (1 << SWP_TYPE_SHIFT) - 1;

/// Location of a page in swap: the area it belongs to and the page offset
/// inside that area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapEntry(u64);

impl SwapEntry {
    pub const fn new(swap_type: u32, offset: u64) -> Self {
        debug_assert!(swap_type < MAX_SWAPFILES, "swap type out of range");
        Self(((swap_type as u64) << SWP_TYPE_SHIFT) | (offset & SWP_OFFSET_MASK))
    }

    pub const fn from_val(val: u64) -> Self {
        Self(val)
    }

    pub const fn val(self) -> u64 {
        self.0
    }

    pub const fn swap_type(self) -> u32 {
        (self.0 >> SWP_TYPE_SHIFT) as u32
    }

    pub const fn offset(self) -> u64 {
        self.0 & SWP_OFFSET_MASK
    }
}

pub struct Page {
    flags: PageFlags,
    io: AtomicU8,
    order: u32,
    /// Raw [`SwapEntry`] while [`PageFlag::SWAPCACHE`] is set.
    private: AtomicU64,
    data: Spin<Box<[u8]>>,
}

impl Page {
    pub fn alloc() -> Arc<Self> {
        Self::alloc_order(0)
    }

    /// Allocate a zeroed page made of `1 << order` contiguous base pages.
    pub fn alloc_order(order: u32) -> Arc<Self> {
        Arc::new(Self {
            flags: PageFlags::new(),
            io: AtomicU8::new(IoState::Idle as u8),
            order,
            private: AtomicU64::new(0),
            data: Spin::new(vec![0u8; PAGE_SIZE << order].into_boxed_slice()),
        })
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn nr_pages(&self) -> usize {
        1 << self.order
    }

    pub fn is_huge(&self) -> bool {
        self.order != 0
    }

    /// Length of the page content in bytes.
    pub fn len(&self) -> usize {
        PAGE_SIZE << self.order
    }

    pub fn flags(&self) -> PageFlag {
        self.flags.load()
    }

    pub fn data(&self) -> SpinGuard<'_, Box<[u8]>> {
        self.data.lock()
    }

    pub fn try_lock(&self) -> bool {
        !self.flags.set(PageFlag::LOCKED).contains(PageFlag::LOCKED)
    }

    pub fn is_locked(&self) -> bool {
        self.flags.has(PageFlag::LOCKED)
    }

    pub fn unlock(&self) {
        let old = self.flags.clear(PageFlag::LOCKED);
        assert!(old.contains(PageFlag::LOCKED), "Unlocking an unlocked page");
    }

    pub fn is_uptodate(&self) -> bool {
        self.flags.has(PageFlag::UPTODATE)
    }

    /// Mark the content valid. Clears any error left by an earlier attempt.
    pub fn set_uptodate(&self) {
        self.flags.update(PageFlag::UPTODATE, PageFlag::ERROR);
    }

    /// Mark a failed read: errored and not valid, in one step.
    pub fn set_read_error(&self) {
        self.flags.update(PageFlag::ERROR, PageFlag::UPTODATE);
    }

    pub fn has_error(&self) -> bool {
        self.flags.has(PageFlag::ERROR)
    }

    pub fn set_error(&self) {
        self.flags.set(PageFlag::ERROR);
    }

    pub fn clear_error(&self) {
        self.flags.clear(PageFlag::ERROR);
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.has(PageFlag::DIRTY)
    }

    /// # Returns
    /// Whether the page was clean before.
    pub fn set_dirty(&self) -> bool {
        !self.flags.set(PageFlag::DIRTY).contains(PageFlag::DIRTY)
    }

    /// # Returns
    /// Whether the page was dirty before.
    pub fn clear_dirty(&self) -> bool {
        self.flags.clear(PageFlag::DIRTY).contains(PageFlag::DIRTY)
    }

    pub fn is_reclaim(&self) -> bool {
        self.flags.has(PageFlag::RECLAIM)
    }

    pub fn set_reclaim(&self) {
        self.flags.set(PageFlag::RECLAIM);
    }

    pub fn clear_reclaim(&self) {
        self.flags.clear(PageFlag::RECLAIM);
    }

    pub fn add_to_swap_cache(&self, entry: SwapEntry) {
        self.private.store(entry.val(), Ordering::Release);
        self.flags.set(PageFlag::SWAPCACHE);
    }

    pub fn delete_from_swap_cache(&self) {
        self.flags.clear(PageFlag::SWAPCACHE);
        self.private.store(0, Ordering::Release);
    }

    pub fn swap_entry(&self) -> Option<SwapEntry> {
        if !self.flags.has(PageFlag::SWAPCACHE) {
            return None;
        }

        Some(SwapEntry::from_val(self.private.load(Ordering::Acquire)))
    }

    pub fn io_state(&self) -> IoState {
        IoState::from_raw(self.io.load(Ordering::Acquire))
    }

    fn transit_io(&self, from: IoState, to: IoState) {
        if let Err(current) =
            self.io
                .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            panic!(
                "page io state: expected {:?}, found {:?} while moving to {:?}",
                from,
                IoState::from_raw(current),
                to
            );
        }
    }

    pub fn is_writeback(&self) -> bool {
        self.io_state() == IoState::WritebackInFlight
    }

    pub fn set_writeback(&self) {
        self.transit_io(IoState::Idle, IoState::WritebackInFlight);
    }

    pub fn end_writeback(&self) {
        self.transit_io(IoState::WritebackInFlight, IoState::Idle);
    }

    pub fn start_read(&self) {
        self.transit_io(IoState::Idle, IoState::ReadInFlight);
    }

    pub fn end_read(&self) {
        self.transit_io(IoState::ReadInFlight, IoState::Idle);
    }

    pub fn state(&self) -> PageState {
        match self.io_state() {
            IoState::ReadInFlight => return PageState::ReadInFlight,
            IoState::WritebackInFlight => return PageState::WritebackInFlight,
            IoState::Idle => {}
        }

        let flags = self.flags();
        if flags.contains(PageFlag::LOCKED) {
            PageState::LockedPending
        } else if flags.contains(PageFlag::ERROR) {
            PageState::Errored
        } else if flags.contains(PageFlag::UPTODATE) {
            PageState::Valid
        } else {
            PageState::Unlocked
        }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("flags", &self.flags())
            .field("io", &self.io_state())
            .field("order", &self.order)
            .field("entry", &self.swap_entry())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_exclusive() {
        let page = Page::alloc();
        assert!(page.try_lock());
        assert!(!page.try_lock());
        page.unlock();
        assert!(page.try_lock());
    }

    #[test]
    #[should_panic(expected = "Unlocking an unlocked page")]
    fn unlock_twice_panics() {
        let page = Page::alloc();
        assert!(page.try_lock());
        page.unlock();
        page.unlock();
    }

    #[test]
    fn uptodate_and_error_exclude_each_other() {
        let page = Page::alloc();
        page.set_read_error();
        assert!(page.has_error() && !page.is_uptodate());

        page.set_uptodate();
        assert!(page.is_uptodate() && !page.has_error());

        page.set_read_error();
        assert_eq!(page.state(), PageState::Errored);
    }

    #[test]
    #[should_panic(expected = "expected Idle")]
    fn single_writeback_in_flight() {
        let page = Page::alloc();
        page.set_writeback();
        page.set_writeback();
    }

    #[test]
    fn state_snapshot_follows_transitions() {
        let page = Page::alloc();
        assert_eq!(page.state(), PageState::Unlocked);

        assert!(page.try_lock());
        assert_eq!(page.state(), PageState::LockedPending);

        page.start_read();
        assert_eq!(page.state(), PageState::ReadInFlight);
        page.set_uptodate();
        page.end_read();
        page.unlock();
        assert_eq!(page.state(), PageState::Valid);

        page.set_writeback();
        assert_eq!(page.state(), PageState::WritebackInFlight);
        page.end_writeback();
        assert_eq!(page.state(), PageState::Valid);
    }

    #[test]
    fn swap_entry_packs_type_and_offset() {
        let entry = SwapEntry::new(3, 0x1234);
        assert_eq!(entry.swap_type(), 3);
        assert_eq!(entry.offset(), 0x1234);

        let page = Page::alloc_order(2);
        assert_eq!(page.swap_entry(), None);
        page.add_to_swap_cache(entry);
        assert_eq!(page.swap_entry(), Some(entry));
        assert_eq!(page.len(), PAGE_SIZE * 4);
        assert_eq!(page.nr_pages(), 4);
    }

    #[test]
    fn last_swap_type_keeps_its_bits() {
        let entry = SwapEntry::new(MAX_SWAPFILES - 1, 5);
        assert_eq!(entry.swap_type(), MAX_SWAPFILES - 1);
        assert_eq!(entry.offset(), 5);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "swap type out of range")]
    fn swap_type_past_the_limit_panics() {
        SwapEntry::new(MAX_SWAPFILES, 5);
    }
}
