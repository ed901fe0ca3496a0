#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod activate;
mod bio;
mod block;
mod constants;
mod end_io;
mod extent;
mod frontswap;
mod page;
mod page_io;
mod prelude;
mod psi;
mod slots;
mod stats;
mod swap_info;
mod waiter;
mod writeback;

#[cfg(test)]
mod testing;

pub use activate::{generic_swapfile_activate, Activation, SwapFile};
pub use bio::{BioEndIo, ReqFlags, ReqOp, SwapBio};
pub use block::{make_device, BlockDevice, BlockRequestQueue, DevId, QueueCookie};
pub use constants::*;
pub use end_io::{end_swap_bio_read, end_swap_bio_write};
pub use extent::{ExtentTable, SwapExtent};
pub use frontswap::Frontswap;
pub use page::{IoState, Page, PageFlag, PageState, SwapEntry};
pub use page_io::SwapIo;
pub use prelude::KResult;
pub use psi::{MemStall, MemStallGuard, NoMemStall};
pub use slots::SwapMap;
pub use stats::{SwapCounters, SwapEvent, SwapMetric, SwapStats};
pub use swap_info::{SwapArea, SwapBacking, SwapFlags, SwapInfo};
pub use waiter::IoWaiter;
pub use writeback::{IoClass, SyncMode, WritebackControl};
