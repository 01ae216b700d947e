//! RTP forwarding core for a selective forwarding unit.
//!
//! This crate accepts media from publishing peers, keeps per-stream
//! quality state, and forwards packets to subscribers while running the
//! standard WebRTC feedback loops: NACK-based loss recovery, PLI/FIR
//! keyframe requests, sender/receiver reports, source descriptions, and
//! REMB bitrate signaling.
//!
//! ## Architecture
//!
//! - **[`UpConnection`] / [`UpTrack`]**: a publishing peer and its inbound
//!   streams.  Each track runs an ingest reader and an RTCP listener; the
//!   connection emits receiver reports and REMB once per second.
//! - **[`DownConnection`] / [`DownTrack`]**: a subscribing peer and its
//!   outbound streams, with a loss-based rate controller, RTT estimation,
//!   and per-second sender reports.
//! - **Writer pool**: one send worker per subscription, fed by the ingest
//!   reader, pacing packets and dropping rather than back-pressuring.
//! - **[`packetcache`]**: a retransmission cache sized adaptively from the
//!   subscribers' RTT and jitter.
//!
//! SDP negotiation, ICE, DTLS/SRTP and room membership are out of scope;
//! they are reached through the narrow traits in [`transport`] and
//! [`group`].

pub mod config;
pub mod down;
pub mod error;
pub mod estimator;
pub mod feedback;
pub mod group;
pub mod jitter;
pub mod packetcache;
pub mod rtcp;
pub mod rtptime;
pub mod stats;
pub mod transport;
pub mod types;
pub mod up;
mod writer;

pub use crate::config::SfuConfig;
pub use crate::down::{DownConnection, DownTrack};
pub use crate::error::{Error, Result};
pub use crate::rtcp::RtcpPacket;
pub use crate::transport::{
    IceCandidateInit, PeerTransport, RtcpReader, RtpReader, RtpWriter, TransportState,
};
pub use crate::types::{Codec, RtcpFeedback, Ssrc, TrackKind};
pub use crate::up::{InboundTrack, UpConnection, UpTrack};
