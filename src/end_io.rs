use crate::{bio::SwapBio, page::Page, prelude::*, swap_info::SwapFlags, swap_info::SwapInfo};

pub fn end_swap_bio_write(bio: Box<SwapBio>) {
    let page = bio.page();

    println_trace!(
        "trace_swap",
        "swap: write done at sector {}: {:?}",
        bio.sector(),
        bio.status()
    );

    if bio.status().is_err() {
        page.set_error();
        // Keep the page around for reclaim to retry.
        page.set_dirty();
        println_fatal!(
            "Write-error on swap-device ({}:{}:{})",
            bio.bdev().major(),
            bio.bdev().minor(),
            bio.sector()
        );
        page.clear_reclaim();
    }

    page.end_writeback();
}

/// Tell the device that the slot of a freshly read page may be dropped if
/// the page is its only user. The page is dirtied so it gets written out
/// again instead of being discarded.
///
/// Called with the page locked.
pub(crate) fn swap_slot_free_notify(sis: &SwapInfo, page: &Page) {
    // Not every reader goes through the swap cache.
    let Some(entry) = page.swap_entry() else {
        return;
    };

    if !sis.flags().contains(SwapFlags::BLKDEV) {
        return;
    }

    let Some(bdev) = sis.bdev() else {
        return;
    };

    if bdev.has_slot_free_notify() && sis.swap_map().swap_count(entry.offset()) == 1 {
        page.set_dirty();
        bdev.swap_slot_free_notify(entry.offset());
    }
}

pub fn end_swap_bio_read(mut bio: Box<SwapBio>) {
    let page = bio.page().clone();

    println_trace!(
        "trace_swap",
        "swap: read done at sector {}: {:?}",
        bio.sector(),
        bio.status()
    );

    match bio.status() {
        Err(_) => {
            page.set_read_error();
            println_fatal!(
                "Read-error on swap-device ({}:{}:{})",
                bio.bdev().major(),
                bio.bdev().minor(),
                bio.sector()
            );
        }
        Ok(()) => {
            page.set_uptodate();
            swap_slot_free_notify(bio.sis(), &page);
        }
    }

    page.end_read();
    page.unlock();

    let waiter = bio.take_waiter();
    drop(bio);

    if let Some(waiter) = waiter {
        waiter.wake();
    }
}
