//! Monotonic time in jiffies and NTP conversions.
//!
//! All cross-thread timestamps in this crate are expressed in jiffies, a
//! monotonic tick counted from process start at a fixed rate that is an
//! exact multiple of 65536.  NTP 64-bit timestamps only appear at the RTCP
//! sender-report boundary.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;

/// Resolution of the jiffies clock.
pub const JIFFIES_PER_SEC: u64 = 65536 * 1024;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_EPOCH_OFFSET: u64 = 2_208_988_800;

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Current monotonic time in jiffies.
#[must_use]
pub fn jiffies() -> u64 {
    from_duration(EPOCH.elapsed(), JIFFIES_PER_SEC)
}

/// Current monotonic time in units of `rate` ticks per second.
#[must_use]
pub fn now_in(rate: u64) -> u64 {
    from_duration(EPOCH.elapsed(), rate)
}

/// Convert a duration to ticks at `rate` ticks per second.
#[must_use]
pub fn from_duration(d: Duration, rate: u64) -> u64 {
    (d.as_nanos() as u128 * rate as u128 / 1_000_000_000) as u64
}

/// Convert ticks at `rate` ticks per second to a duration.
#[must_use]
pub fn to_duration(units: u64, rate: u64) -> Duration {
    Duration::from_nanos((units as u128 * 1_000_000_000 / rate as u128) as u64)
}

/// Wall-clock time as a 64-bit NTP timestamp (seconds since 1900 in the
/// high half, fractional seconds in the low half).
#[must_use]
pub fn system_time_to_ntp(t: SystemTime) -> u64 {
    let since_unix = t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    let secs = since_unix.as_secs() + NTP_EPOCH_OFFSET;
    let frac = (u64::from(since_unix.subsec_nanos()) << 32) / 1_000_000_000;
    (secs << 32) | frac
}

/// Inverse of [`system_time_to_ntp`].
#[must_use]
pub fn ntp_to_system_time(ntp: u64) -> SystemTime {
    let secs = (ntp >> 32).saturating_sub(NTP_EPOCH_OFFSET);
    let nanos = ((ntp & 0xFFFF_FFFF) * 1_000_000_000) >> 32;
    UNIX_EPOCH + Duration::new(secs, nanos as u32)
}
