use crate::page::Page;

/// Slot bookkeeping of a swap area.
pub trait SwapMap: Send + Sync {
    /// Number of references to swap slot `offset`.
    fn swap_count(&self, offset: u64) -> usize;

    /// Drop the page's slot if nothing references it any more. Called on a
    /// locked page about to be written out.
    ///
    /// # Returns
    /// Whether the slot was freed and the write can be skipped.
    fn try_to_free_swap(&self, page: &Page) -> bool {
        let _ = page;
        false
    }
}
