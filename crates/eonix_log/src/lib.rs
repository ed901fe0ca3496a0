#![no_std]

mod ratelimit;

use core::{
    fmt::{self, Write},
    sync::atomic::{AtomicU8, Ordering},
};

use alloc::sync::Arc;
use eonix_sync::Spin;

extern crate alloc;

#[cfg(test)]
extern crate std;

pub use ratelimit::{RateLimit, set_clock, ticks};

pub const DEFAULT_RATELIMIT_INTERVAL: u64 = 5000;
pub const DEFAULT_RATELIMIT_BURST: u32 = 10;

pub trait ConsoleWrite: Send + Sync {
    fn write(&self, s: &str);
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Fatal = 0,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    const fn prefix(self) -> &'static str {
        match self {
            Level::Fatal => "[kernel:fatal] ",
            Level::Error => "[kernel:error] ",
            Level::Warn => "[kernel: warn] ",
            Level::Info => "[kernel: info] ",
            Level::Debug => "[kernel:debug] ",
            Level::Trace => "[kernel:trace] ",
        }
    }
}

static MAX_LEVEL: AtomicU8 = AtomicU8::new(Level::Trace as u8);

/// Drop every message less severe than `level`.
pub fn set_max_level(level: Level) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn enabled(level: Level) -> bool {
    level as u8 <= MAX_LEVEL.load(Ordering::Relaxed)
}

struct Console {
    console: Option<Arc<dyn ConsoleWrite>>,
}

static CONSOLE: Spin<Console> = Spin::new(Console { console: None });

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(console) = &self.console {
            console.write(s);
        }
        Ok(())
    }
}

pub fn set_console(console: Arc<dyn ConsoleWrite>) {
    CONSOLE.lock().console = Some(console);
}

#[doc(hidden)]
pub fn do_print(args: fmt::Arguments) {
    let _ = CONSOLE.lock().write_fmt(args);
}

/// Print one line tagged with `level`. The whole line is written under the
/// console lock so lines from different CPUs never interleave.
#[doc(hidden)]
pub fn do_log(level: Level, args: fmt::Arguments) {
    if enabled(level) {
        let _ = CONSOLE
            .lock()
            .write_fmt(format_args!("{}{}\n", level.prefix(), args));
    }
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::do_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n")
    };
    ($($arg:tt)*) => {
        $crate::print!("{}\n", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log {
    ($level:expr, $($arg:tt)*) => {
        $crate::do_log($level, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println_fatal {
    () => {
        $crate::log!($crate::Level::Fatal, "")
    };
    ($($arg:tt)*) => {
        $crate::log!($crate::Level::Fatal, $($arg)*)
    };
}

#[macro_export]
macro_rules! println_err {
    ($($arg:tt)*) => {
        $crate::log!($crate::Level::Error, $($arg)*)
    };
}

#[macro_export]
macro_rules! println_warn {
    ($($arg:tt)*) => {
        $crate::log!($crate::Level::Warn, $($arg)*)
    };
}

#[macro_export]
macro_rules! println_info {
    ($($arg:tt)*) => {
        $crate::log!($crate::Level::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! println_debug {
    ($($arg:tt)*) => {
        $crate::log!($crate::Level::Debug, $($arg)*)
    };
}

/// Print an error line, at most `DEFAULT_RATELIMIT_BURST` times per
/// `DEFAULT_RATELIMIT_INTERVAL` ticks for each call site.
#[macro_export]
macro_rules! println_err_ratelimited {
    ($($arg:tt)*) => {{
        static RATELIMIT: $crate::RateLimit = $crate::RateLimit::new(
            $crate::DEFAULT_RATELIMIT_INTERVAL,
            $crate::DEFAULT_RATELIMIT_BURST,
        );

        if RATELIMIT.check() {
            $crate::println_err!($($arg)*)
        }
    }};
}

/// Trace line compiled in only when the calling crate enables `$feat`.
#[macro_export]
macro_rules! println_trace {
    ($feat:literal) => {
        #[deny(unexpected_cfgs)]
        {
            #[cfg(feature = $feat)]
            $crate::log!($crate::Level::Trace, "")
        }
    };
    ($feat:literal, $($arg:tt)*) => {{
        #[deny(unexpected_cfgs)]
        {
            #[cfg(feature = $feat)]
            $crate::log!($crate::Level::Trace, $($arg)*)
        }
    }};
}
