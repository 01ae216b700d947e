//! Forwarder configuration.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the forwarding core.
///
/// The defaults match typical conference deployments; everything here is
/// per-process, not per-connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SfuConfig {
    /// Floor for the REMB bitrate signalled upstream (bits per second).
    pub min_bitrate: u64,
    /// Assumed rate for an audio subscriber without recent feedback.
    pub audio_fallback_bitrate: u64,
    /// Assumed rate for a video subscriber without recent feedback.
    pub video_fallback_bitrate: u64,
    /// Lower clamp for the retransmission cache, in packets.
    pub min_cache_packets: usize,
    /// Upper clamp for the retransmission cache, in packets.
    pub max_cache_packets: usize,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            min_bitrate: 200_000,
            audio_fallback_bitrate: 128 * 1024,
            video_fallback_bitrate: 512 * 1024,
            min_cache_packets: 32,
            max_cache_packets: 256,
        }
    }
}
