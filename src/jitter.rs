//! RFC 3550 interarrival jitter estimation.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::rtptime;

/// Interarrival jitter accumulator for one inbound stream.
///
/// Keeps the estimate in the media clock rate, scaled by 16 internally as
/// in RFC 3550 A.8, so `J += (|D| - J) / 16` stays in integer arithmetic.
#[derive(Debug)]
pub struct Jitter {
    clock_rate: u32,
    scaled: AtomicU32,
    transit: Mutex<Option<u32>>,
}

impl Jitter {
    #[must_use]
    pub fn new(clock_rate: u32) -> Self {
        Self {
            clock_rate,
            scaled: AtomicU32::new(0),
            transit: Mutex::new(None),
        }
    }

    /// Feed the RTP timestamp of a freshly received packet.
    pub fn accumulate(&self, timestamp: u32) {
        let arrival = rtptime::now_in(u64::from(self.clock_rate)) as u32;
        self.accumulate_at(timestamp, arrival);
    }

    /// As [`accumulate`](Self::accumulate), with the arrival time supplied
    /// in clock-rate units.
    pub fn accumulate_at(&self, timestamp: u32, arrival: u32) {
        let transit = arrival.wrapping_sub(timestamp);
        let mut prev = self.transit.lock();
        if let Some(prev_transit) = prev.replace(transit) {
            let d = (transit.wrapping_sub(prev_transit)) as i32;
            let d = d.unsigned_abs();
            let scaled = self.scaled.load(Ordering::Relaxed);
            let next = scaled.wrapping_add(d.wrapping_sub((scaled + 8) >> 4));
            self.scaled.store(next, Ordering::Relaxed);
        }
    }

    /// Current jitter estimate in clock-rate units.
    #[must_use]
    pub fn jitter(&self) -> u32 {
        self.scaled.load(Ordering::Relaxed) >> 4
    }

    #[must_use]
    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }
}
