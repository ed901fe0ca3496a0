/// Accounting of time spent stalled on memory.
pub trait MemStall: Send + Sync {
    /// # Returns
    /// Opaque state handed back to [`MemStall::leave`].
    fn enter(&self) -> u64;

    fn leave(&self, flags: u64);
}

pub struct NoMemStall;

impl MemStall for NoMemStall {
    fn enter(&self) -> u64 {
        0
    }

    fn leave(&self, _: u64) {}
}

/// Stall section that ends when dropped.
#[must_use]
pub struct MemStallGuard<'a> {
    psi: &'a dyn MemStall,
    flags: u64,
}

impl<'a> MemStallGuard<'a> {
    pub fn new(psi: &'a dyn MemStall) -> Self {
        let flags = psi.enter();
        Self { psi, flags }
    }
}

impl Drop for MemStallGuard<'_> {
    fn drop(&mut self) {
        self.psi.leave(self.flags);
    }
}
