//! Atomic telemetry cells.
//!
//! These are single-writer, multi-reader snapshots sampled across threads
//! without a lock.  Staleness is part of the contract: a value older than
//! [`RECEIVER_REPORT_TIMEOUT`] must never be mistaken for a current one.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::rtptime::JIFFIES_PER_SEC;

/// How long a reported value stays meaningful.
pub const RECEIVER_REPORT_TIMEOUT: u64 = 8 * JIFFIES_PER_SEC;

/// An atomically updated (bitrate, timestamp) pair.
#[derive(Debug, Default)]
pub struct Bitrate {
    bitrate: AtomicU64,
    jiffies: AtomicU64,
}

impl Bitrate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, bitrate: u64, now: u64) {
        self.bitrate.store(bitrate, Ordering::Relaxed);
        self.jiffies.store(now, Ordering::Relaxed);
    }

    /// The stored rate, or `u64::MAX` when the value is stale or stamped
    /// in the future.
    #[must_use]
    pub fn get(&self, now: u64) -> u64 {
        let ts = self.jiffies.load(Ordering::Relaxed);
        if now < ts || now - ts > RECEIVER_REPORT_TIMEOUT {
            return u64::MAX;
        }
        self.bitrate.load(Ordering::Relaxed)
    }
}

/// An atomically updated (fraction lost, interarrival jitter, timestamp)
/// snapshot taken from receiver reports.
#[derive(Debug, Default)]
pub struct ReceiverStats {
    loss: AtomicU32,
    jitter: AtomicU32,
    jiffies: AtomicU64,
}

impl ReceiverStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, loss: u8, jitter: u32, now: u64) {
        self.loss.store(u32::from(loss), Ordering::Relaxed);
        self.jitter.store(jitter, Ordering::Relaxed);
        self.jiffies.store(now, Ordering::Relaxed);
    }

    /// The stored snapshot, or `(0, 0)` when stale.
    #[must_use]
    pub fn get(&self, now: u64) -> (u8, u32) {
        let ts = self.jiffies.load(Ordering::Relaxed);
        if now < ts || now > ts + RECEIVER_REPORT_TIMEOUT {
            return (0, 0);
        }
        (
            self.loss.load(Ordering::Relaxed) as u8,
            self.jitter.load(Ordering::Relaxed),
        )
    }
}
