//! Common types shared by the up and down sides of the forwarder.

use serde::{Deserialize, Serialize};

/// 32-bit RTP synchronization source identifier.
pub type Ssrc = u32;

/// Media track kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    /// Default stream label used when signaling did not provide one.
    #[must_use]
    pub const fn default_label(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// One negotiated RTCP feedback capability, e.g. `("nack", "pli")` or
/// `("ccm", "fir")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcpFeedback {
    pub kind: String,
    pub parameter: String,
}

impl RtcpFeedback {
    pub fn new(kind: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            parameter: parameter.into(),
        }
    }
}

/// Negotiated codec description for a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codec {
    pub kind: TrackKind,
    pub mime_type: String,
    pub clock_rate: u32,
    pub feedback: Vec<RtcpFeedback>,
}

impl Codec {
    pub fn new(kind: TrackKind, mime_type: impl Into<String>, clock_rate: u32) -> Self {
        Self {
            kind,
            mime_type: mime_type.into(),
            clock_rate,
            feedback: Vec::new(),
        }
    }

    /// Add a negotiated feedback capability.
    #[must_use]
    pub fn with_feedback(mut self, kind: &str, parameter: &str) -> Self {
        self.feedback.push(RtcpFeedback::new(kind, parameter));
        self
    }

    /// Whether the codec negotiated the given RTCP feedback capability.
    #[must_use]
    pub fn supports_feedback(&self, kind: &str, parameter: &str) -> bool {
        self.feedback
            .iter()
            .any(|fb| fb.kind == kind && fb.parameter == parameter)
    }

    #[must_use]
    pub fn is_video(&self) -> bool {
        self.kind == TrackKind::Video
    }
}
