pub const EIO: u32 = 5;
pub const ENOMEM: u32 = 12;
pub const EEXIST: u32 = 17;
pub const ENOENT: u32 = 2;
pub const EINVAL: u32 = 22;
pub const EOPNOTSUPP: u32 = 95;

pub const PAGE_SIZE_BITS: u32 = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SIZE_BITS;

/// Block layer sectors are always 512 bytes.
pub const SECTOR_SHIFT: u32 = 9;
pub const SECTORS_PER_PAGE_SHIFT: u32 = PAGE_SIZE_BITS - SECTOR_SHIFT;

/// How many times a synchronous read polls the queue before it only sleeps.
pub const SYNC_POLL_BUDGET: usize = 16;
/// Relax rounds a synchronous reader sleeps between two polls once the
/// budget above is used up.
pub const SYNC_PARK_ROUNDS: usize = 1024;

pub const DEFAULT_QUEUE_DEPTH: usize = 128;

/// Bits of a swap entry holding the area type.
pub const MAX_SWAPFILES_SHIFT: u32 = 6;
pub const MAX_SWAPFILES: u32 = 1 << MAX_SWAPFILES_SHIFT;
