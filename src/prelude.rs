#[allow(dead_code)]
pub type KResult<T> = Result<T, u32>;

#[allow(unused_imports)]
pub(crate) use alloc::{boxed::Box, sync::Arc, vec, vec::Vec};

#[allow(unused_imports)]
pub(crate) use eonix_log::{
    println_debug, println_err, println_err_ratelimited, println_fatal, println_info,
    println_trace, println_warn,
};
