use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The codec for this track did not negotiate the requested RTCP
    /// feedback capability.
    #[error("unsupported feedback type")]
    UnsupportedFeedback,

    /// Feedback suppressed by the per-track rate limit.
    #[error("rate limited")]
    RateLimited,

    /// The peer connection terminated; the owning loop should exit.
    #[error("transport closed")]
    TransportClosed,

    /// RTP or RTCP parse failure.
    #[error("malformed packet: {0}")]
    Malformed(#[from] webrtc_util::Error),

    /// The requested cache slot has been overwritten.
    #[error("cache miss")]
    CacheMiss,
}

impl Error {
    /// Whether the owning loop should terminate on this error.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TransportClosed)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
