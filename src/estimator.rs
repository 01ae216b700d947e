//! Sliding-window throughput estimation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Windowed byte and packet rate estimator.
///
/// `accumulate` is wait-free and safe to call from the hot ingest path;
/// the window swap happens lazily on `estimate`.
#[derive(Debug)]
pub struct Estimator {
    window: Duration,
    bytes: AtomicU32,
    packets: AtomicU32,
    total_bytes: AtomicU32,
    total_packets: AtomicU32,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    byte_rate: u32,
    packet_rate: u32,
    since: Instant,
}

impl Estimator {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            bytes: AtomicU32::new(0),
            packets: AtomicU32::new(0),
            total_bytes: AtomicU32::new(0),
            total_packets: AtomicU32::new(0),
            inner: Mutex::new(Inner {
                byte_rate: 0,
                packet_rate: 0,
                since: Instant::now(),
            }),
        }
    }

    /// Record one packet of `bytes` bytes.
    pub fn accumulate(&self, bytes: u32) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.total_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Current `(bytes_per_sec, packets_per_sec)` estimate.
    pub fn estimate(&self) -> (u32, u32) {
        let mut inner = self.inner.lock();
        let elapsed = inner.since.elapsed();
        if elapsed >= self.window {
            let bytes = self.bytes.swap(0, Ordering::Relaxed);
            let packets = self.packets.swap(0, Ordering::Relaxed);
            let millis = elapsed.as_millis().max(1) as u64;
            inner.byte_rate = (u64::from(bytes) * 1000 / millis) as u32;
            inner.packet_rate = (u64::from(packets) * 1000 / millis) as u32;
            inner.since = Instant::now();
        }
        (inner.byte_rate, inner.packet_rate)
    }

    #[cfg(test)]
    pub(crate) fn force_rate(&self, byte_rate: u32, packet_rate: u32) {
        let mut inner = self.inner.lock();
        inner.byte_rate = byte_rate;
        inner.packet_rate = packet_rate;
    }

    /// Lifetime `(packets, bytes)` totals, as reported in sender reports.
    pub fn totals(&self) -> (u32, u32) {
        (
            self.total_packets.load(Ordering::Relaxed),
            self.total_bytes.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_accumulate() {
        let estimator = Estimator::new(Duration::from_secs(1));
        estimator.accumulate(1200);
        estimator.accumulate(800);
        assert_eq!(estimator.totals(), (2, 2000));
    }

    #[test]
    fn estimate_before_window_is_zero() {
        let estimator = Estimator::new(Duration::from_secs(3600));
        estimator.accumulate(1200);
        assert_eq!(estimator.estimate(), (0, 0));
    }

    #[test]
    fn estimate_after_window() {
        let estimator = Estimator::new(Duration::from_millis(10));
        for _ in 0..10 {
            estimator.accumulate(100);
        }
        std::thread::sleep(Duration::from_millis(20));
        let (byte_rate, packet_rate) = estimator.estimate();
        assert!(byte_rate > 0);
        assert!(packet_rate > 0);
        // 1000 bytes over at least 20ms comes out below the per-second total
        assert!(byte_rate <= 50_000);
    }
}
