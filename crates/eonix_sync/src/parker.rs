use crate::relax::{Relax, SpinRelax};
use alloc::{sync::Arc, task::Wake};
use core::{
    marker::PhantomData,
    sync::atomic::{AtomicU32, Ordering},
};

const RUNNING: u32 = 0;
const PARKING: u32 = 1;
const PARKED: u32 = 2;

/// Sleep/wakeup handshake for a single task.
///
/// The owner announces its intention to sleep with [`Parker::prepare_park`],
/// re-checks its wakeup condition and then calls [`Parker::park`]. A wakeup
/// that races with the re-check moves the state back to `RUNNING` so the
/// following `park` returns immediately instead of missing the event.
///
/// Parking is uninterruptible: the only way out of [`Parker::park`] is a
/// wakeup through [`Parker::unpark`] or the [`Wake`] implementation.
/// [`Parker::park_timeout`] additionally gives up after a bounded number of
/// relax rounds.
#[derive(Debug)]
pub struct Parker<R = SpinRelax> {
    state: AtomicU32,
    _relax: PhantomData<R>,
}

impl<R> Parker<R>
where
    R: Relax,
{
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(RUNNING),
            _relax: PhantomData,
        }
    }

    pub fn state(&self) -> u32 {
        self.state.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.state() == RUNNING
    }

    /// Announce that we are about to sleep. Must be followed by either
    /// [`Parker::park`] or [`Parker::set_running`].
    pub fn prepare_park(&self) {
        self.state.store(PARKING, Ordering::Release);
    }

    /// Go back to running without sleeping.
    pub fn set_running(&self) {
        self.state.store(RUNNING, Ordering::Release);
    }

    fn try_park(&self) -> bool {
        match self.state.compare_exchange(
            PARKING,
            PARKED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(RUNNING) => false,
            Err(_) => unreachable!("Invalid parker state while trying to park."),
        }
    }

    /// Sleep until someone calls [`Parker::unpark`].
    pub fn park(&self) {
        if !self.try_park() {
            return;
        }

        while !self.is_running() {
            R::relax();
        }
    }

    /// Sleep until someone calls [`Parker::unpark`] or `R::relax` has run
    /// `rounds` times, whichever comes first. Leaves the parker running.
    ///
    /// # Returns
    /// Whether we were woken up.
    pub fn park_timeout(&self, rounds: usize) -> bool {
        if !self.try_park() {
            return true;
        }

        for _ in 0..rounds {
            if self.is_running() {
                return true;
            }
            R::relax();
        }

        // A failed exchange means an `unpark` got here first.
        self.state
            .compare_exchange(PARKED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
    }

    /// # Returns
    /// Whether the task was sleeping or about to sleep.
    pub fn unpark(&self) -> bool {
        self.state.swap(RUNNING, Ordering::AcqRel) != RUNNING
    }
}

impl<R> Default for Parker<R>
where
    R: Relax,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Wake for Parker<R>
where
    R: Relax + Send + Sync + 'static,
{
    fn wake(self: Arc<Self>) {
        self.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.unpark();
    }
}
