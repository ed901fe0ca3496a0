use crate::{page::Page, prelude::*};

/// A compressed or remote page store sitting in front of the swap device.
///
/// Every method takes a locked page with a swap entry and reports whether
/// the store handled it. A `false` sends the page down to the device.
pub trait Frontswap: Send + Sync {
    fn try_store(&self, page: &Arc<Page>) -> bool;

    /// Fill the page from the store. The store sets the page up to date.
    fn try_load(&self, page: &Arc<Page>) -> bool;

    /// Like [`Frontswap::try_load`], but the store may finish the load
    /// later, unlocking the page when done.
    fn try_load_async(&self, page: &Arc<Page>) -> bool {
        self.try_load(page)
    }
}
