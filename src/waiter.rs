use crate::{
    block::{BlockDevice, QueueCookie},
    constants::{SYNC_PARK_ROUNDS, SYNC_POLL_BUDGET},
    prelude::*,
};
use core::{
    ptr::null_mut,
    sync::atomic::{AtomicPtr, Ordering},
    task::Waker,
};
use eonix_sync::{Parker, Relax};

/// The task sleeping on a synchronous swap read.
///
/// The completion side takes the waker out and the reader checks for it
/// being gone, so the task is woken at most once and a wakeup that
/// arrives before the reader sleeps is never lost.
pub struct IoWaiter {
    task: AtomicPtr<Waker>,
}

impl IoWaiter {
    pub fn new(waker: Waker) -> Arc<Self> {
        Arc::new(Self {
            task: AtomicPtr::new(Box::into_raw(Box::new(waker))),
        })
    }

    /// Whether the request hasn't completed yet.
    pub fn is_pending(&self) -> bool {
        !self.task.load(Ordering::Acquire).is_null()
    }

    fn take(&self) -> Option<Box<Waker>> {
        let task = self.task.swap(null_mut(), Ordering::AcqRel);
        if task.is_null() {
            None
        } else {
            // SAFETY: `task` came from `Box::into_raw` and the swap above
            //         makes us its only owner.
            Some(unsafe { Box::from_raw(task) })
        }
    }

    /// # Returns
    /// Whether this call woke the task. Only the first call does.
    pub fn wake(&self) -> bool {
        match self.take() {
            Some(waker) => {
                waker.wake();
                true
            }
            None => false,
        }
    }
}

impl Drop for IoWaiter {
    fn drop(&mut self) {
        drop(self.take());
    }
}

/// Wait until the request `waiter` belongs to completes.
///
/// The first [`SYNC_POLL_BUDGET`] failed polls only relax. After that the
/// task sleeps, polling once more each time it wakes up or a sleep of
/// [`SYNC_PARK_ROUNDS`] rounds runs out. There is no way to abort the wait:
/// it ends when the completion handler has taken the waker.
pub(crate) fn wait_for_bio<R>(
    parker: &Parker<R>,
    waiter: &IoWaiter,
    bdev: &BlockDevice,
    cookie: QueueCookie,
) where
    R: Relax,
{
    let mut budget = SYNC_POLL_BUDGET;

    loop {
        parker.prepare_park();
        if !waiter.is_pending() {
            break;
        }

        if bdev.poll(cookie, true) {
            continue;
        }

        if budget > 0 {
            budget -= 1;
            parker.set_running();
            R::relax();
            continue;
        }

        parker.park_timeout(SYNC_PARK_ROUNDS);
    }

    parker.set_running();
}
