use crate::page::Page;
use core::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapEvent {
    /// A page read from swap.
    PswpIn,
    /// A base page written to swap.
    PswpOut,
    /// A huge page written to swap as a whole.
    ThpSwpOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapMetric {
    /// Cycles spent storing pages into the front store.
    SwapOutLatency,
}

/// Sink for swap instrumentation.
pub trait SwapStats: Send + Sync {
    fn record_many(&self, event: SwapEvent, count: u64);

    fn record(&self, event: SwapEvent) {
        self.record_many(event, 1);
    }

    fn accumulate(&self, metric: SwapMetric, delta: u64) {
        let _ = (metric, delta);
    }

    /// Current cycle counter, used to time [`SwapMetric`]s.
    fn cycles(&self) -> u64 {
        0
    }
}

pub(crate) fn count_swpout(stats: &dyn SwapStats, page: &Page) {
    if page.is_huge() {
        stats.record(SwapEvent::ThpSwpOut);
    }

    stats.record_many(SwapEvent::PswpOut, page.nr_pages() as u64);
}

/// Plain atomic counters, optionally timed by `clock`.
#[derive(Debug, Default)]
pub struct SwapCounters {
    pswpin: AtomicU64,
    pswpout: AtomicU64,
    thp_swpout: AtomicU64,
    swapout_latency: AtomicU64,
    clock: Option<fn() -> u64>,
}

impl SwapCounters {
    pub const fn new() -> Self {
        Self {
            pswpin: AtomicU64::new(0),
            pswpout: AtomicU64::new(0),
            thp_swpout: AtomicU64::new(0),
            swapout_latency: AtomicU64::new(0),
            clock: None,
        }
    }

    pub const fn with_clock(clock: fn() -> u64) -> Self {
        let mut counters = Self::new();
        counters.clock = Some(clock);
        counters
    }

    pub fn get(&self, event: SwapEvent) -> u64 {
        self.counter(event).load(Ordering::Relaxed)
    }

    pub fn metric(&self, metric: SwapMetric) -> u64 {
        match metric {
            SwapMetric::SwapOutLatency => self.swapout_latency.load(Ordering::Relaxed),
        }
    }

    fn counter(&self, event: SwapEvent) -> &AtomicU64 {
        match event {
            SwapEvent::PswpIn => &self.pswpin,
            SwapEvent::PswpOut => &self.pswpout,
            SwapEvent::ThpSwpOut => &self.thp_swpout,
        }
    }
}

impl SwapStats for SwapCounters {
    fn record_many(&self, event: SwapEvent, count: u64) {
        self.counter(event).fetch_add(count, Ordering::Relaxed);
    }

    fn accumulate(&self, metric: SwapMetric, delta: u64) {
        match metric {
            SwapMetric::SwapOutLatency => self.swapout_latency.fetch_add(delta, Ordering::Relaxed),
        };
    }

    fn cycles(&self) -> u64 {
        self.clock.map_or(0, |clock| clock())
    }
}
