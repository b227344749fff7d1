use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// A point in time, counted in ticks of a [`MidiClock`]'s sampling rate.
pub type Timestamp = i64;

pub const SAMPLING_RATE_MIN: u32 = 8_000;
pub const SAMPLING_RATE_MAX: u32 = 192_000;
pub const SAMPLING_RATE_DEFAULT: u32 = 44_100;

/// Monotonic tick counter at a configurable sampling rate.
///
/// `now` is derived from a monotonic wall-clock source plus a rebase offset;
/// `set_now` adjusts the offset so that subsequent reads continue from the
/// given timestamp. Timestamps convert between clocks by going through
/// seconds.
#[derive(Debug)]
pub struct MidiClock {
    rate: u32,
    origin: Instant,
    offset: AtomicI64,
}

static GLOBAL_CLOCK: OnceLock<MidiClock> = OnceLock::new();

impl MidiClock {
    /// Create a clock. Rates outside 8 kHz..=192 kHz are clamped.
    pub fn new(rate: u32) -> Self {
        MidiClock {
            rate: rate.clamp(SAMPLING_RATE_MIN, SAMPLING_RATE_MAX),
            origin: Instant::now(),
            offset: AtomicI64::new(0),
        }
    }

    /// The process-wide clock, 44.1 kHz.
    pub fn global() -> &'static MidiClock {
        GLOBAL_CLOCK.get_or_init(|| MidiClock::new(SAMPLING_RATE_DEFAULT))
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    fn elapsed_ticks(&self) -> i64 {
        let nanos = self.origin.elapsed().as_nanos();
        (nanos * self.rate as u128 / 1_000_000_000) as i64
    }

    pub fn now(&self) -> Timestamp {
        self.elapsed_ticks() + self.offset.load(Ordering::Relaxed)
    }

    /// Rebase the clock so that `now()` continues from `now`.
    pub fn set_now(&self, now: Timestamp) {
        self.offset.store(now - self.elapsed_ticks(), Ordering::Relaxed);
    }

    pub fn timestamp_to_seconds(&self, timestamp: Timestamp) -> f64 {
        timestamp as f64 / self.rate as f64
    }

    pub fn timestamp_from_seconds(&self, seconds: f64) -> Timestamp {
        (seconds * self.rate as f64) as Timestamp
    }

    /// Re-express `timestamp`, taken from `source`, on this clock.
    pub fn convert(&self, source: &MidiClock, timestamp: Timestamp) -> Timestamp {
        if self.rate == source.rate {
            return timestamp + (self.now() - source.now());
        }
        let seconds = source.timestamp_to_seconds(timestamp - source.now());
        self.now() + self.timestamp_from_seconds(seconds)
    }
}
