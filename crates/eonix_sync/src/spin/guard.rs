use super::Spin;
use crate::relax::SpinRelax;
use core::{
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

pub(super) struct NotSend(PhantomData<*const ()>);

// SAFETY: Only `Send` is opted out of, sharing a reference is fine.
unsafe impl Sync for NotSend {}

pub struct SpinGuard<'a, T, R = SpinRelax>
where
    T: ?Sized,
{
    pub(super) lock: &'a Spin<T, R>,
    pub(super) value: &'a mut T,
    /// The guard stays on the thread that took the lock.
    pub(super) _not_send: PhantomData<NotSend>,
}

// SAFETY: As long as the value protected by the lock is able to be shared between threads,
//         we can access the guard from multiple threads.
unsafe impl<T, R> Sync for SpinGuard<'_, T, R> where T: ?Sized + Sync {}

impl<T, R> Drop for SpinGuard<'_, T, R>
where
    T: ?Sized,
{
    fn drop(&mut self) {
        unsafe {
            // SAFETY: We are dropping the guard, so we are not holding the lock anymore.
            self.lock.do_unlock();
        }
    }
}

impl<T, R> Deref for SpinGuard<'_, T, R>
where
    T: ?Sized,
{
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: We are holding the lock, so we can safely access the value.
        self.value
    }
}

impl<T, R> DerefMut for SpinGuard<'_, T, R>
where
    T: ?Sized,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: We are holding the lock, so we can safely access the value.
        self.value
    }
}

impl<T, U, R> AsRef<U> for SpinGuard<'_, T, R>
where
    T: ?Sized,
    U: ?Sized,
    <Self as Deref>::Target: AsRef<U>,
{
    fn as_ref(&self) -> &U {
        self.deref().as_ref()
    }
}

impl<T, U, R> AsMut<U> for SpinGuard<'_, T, R>
where
    T: ?Sized,
    U: ?Sized,
    <Self as Deref>::Target: AsMut<U>,
{
    fn as_mut(&mut self) -> &mut U {
        self.deref_mut().as_mut()
    }
}
