// Handshake Badge: Monotonic Timing Helpers
//
// All windows (sample interval, processing interval, collection window,
// debounce) are evaluated against a millisecond counter that wraps at
// ~49 days. Subtraction is always wrapping, so a window that straddles the
// wrap still measures correctly.

/// Milliseconds since boot (wraps at ~49 days, fine for timeouts).
#[cfg(target_os = "espidf")]
pub fn now_ms() -> u32 {
    unsafe { (esp_idf_sys::esp_timer_get_time() / 1000) as u32 }
}

/// Milliseconds elapsed between `since` and `now`, wraparound-safe.
#[inline]
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Rate gate: lets an action through at most once per `period_ms`.
/// The first call always passes.
#[derive(Debug, Clone, Copy)]
pub struct IntervalGate {
    period_ms: u32,
    last: Option<u32>,
}

impl IntervalGate {
    pub const fn new(period_ms: u32) -> Self {
        Self { period_ms, last: None }
    }

    pub fn is_open(&self, now: u32) -> bool {
        match self.last {
            None => true,
            Some(last) => elapsed_ms(now, last) >= self.period_ms,
        }
    }

    /// Consume the gate if open. Returns whether the action may fire.
    pub fn try_pass(&mut self, now: u32) -> bool {
        if self.is_open(now) {
            self.last = Some(now);
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// A window of fixed length anchored at a start instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    start: u32,
    duration_ms: u32,
}

impl Deadline {
    pub const fn starting_at(start: u32, duration_ms: u32) -> Self {
        Self { start, duration_ms }
    }

    pub fn has_elapsed(&self, now: u32) -> bool {
        elapsed_ms(now, self.start) >= self.duration_ms
    }

    pub fn start(&self) -> u32 {
        self.start
    }
}
