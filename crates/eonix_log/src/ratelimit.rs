use eonix_sync::Spin;

static CLOCK: Spin<Option<fn() -> u64>> = Spin::new(None);

/// Register the tick source used by every [`RateLimit`].
///
/// Until a clock is registered, rate limiting is disabled and every message
/// gets through.
pub fn set_clock(clock: fn() -> u64) {
    CLOCK.lock().replace(clock);
}

pub fn ticks() -> Option<u64> {
    let clock = *CLOCK.lock();
    clock.map(|clock| clock())
}

struct RateLimitState {
    begin: Option<u64>,
    printed: u32,
    missed: u32,
}

/// Allow at most `burst` events in every window of `interval` ticks.
pub struct RateLimit {
    interval: u64,
    burst: u32,
    state: Spin<RateLimitState>,
}

impl RateLimit {
    pub const fn new(interval: u64, burst: u32) -> Self {
        Self {
            interval,
            burst,
            state: Spin::new(RateLimitState {
                begin: None,
                printed: 0,
                missed: 0,
            }),
        }
    }

    pub fn check(&self) -> bool {
        match ticks() {
            Some(now) => self.check_at(now),
            None => true,
        }
    }

    pub fn check_at(&self, now: u64) -> bool {
        let mut suppressed = 0;

        let allowed = {
            let mut state = self.state.lock();
            let begin = *state.begin.get_or_insert(now);

            if now.wrapping_sub(begin) >= self.interval {
                suppressed = state.missed;
                state.begin = Some(now);
                state.printed = 0;
                state.missed = 0;
            }

            if state.printed < self.burst {
                state.printed += 1;
                true
            } else {
                state.missed += 1;
                false
            }
        };

        if suppressed != 0 {
            crate::println_warn!("{} callbacks suppressed", suppressed);
        }

        allowed
    }

    pub fn missed(&self) -> u32 {
        self.state.lock().missed
    }
}
