//! Narrow interfaces onto the peer-connection layer.
//!
//! The forwarder never touches SDP, ICE, or DTLS; it consumes the peer
//! connection through these traits and leaves their implementation to the
//! embedding layer.  Tests implement them with in-memory mocks.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::rtcp::RtcpPacket;
use crate::types::TrackKind;

/// Connection-level state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connected,
    Closed,
}

/// A remote ICE candidate, opaque to the forwarder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IceCandidateInit {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// The peer-connection capability consumed by both connection sides.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Send a compound RTCP packet to the peer.
    async fn write_rtcp(&self, packets: &[RtcpPacket]) -> Result<()>;

    fn state(&self) -> TransportState;

    /// Whether the remote description has been applied yet; candidates
    /// arriving earlier must be buffered.
    fn has_remote_description(&self) -> bool;

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<()>;

    /// Create a receive-only transceiver of the given kind.
    async fn add_recvonly_transceiver(&self, kind: TrackKind) -> Result<()>;
}

/// Inbound RTP for one track.
#[async_trait]
pub trait RtpReader: Send + Sync {
    /// Read one RTP packet into `buf`, returning its length.
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;
}

/// Inbound RTCP for one endpoint (receiver or sender side).
#[async_trait]
pub trait RtcpReader: Send + Sync {
    /// Read one compound RTCP datagram.
    async fn read(&self) -> Result<Bytes>;
}

/// Outbound RTP for one track.
#[async_trait]
pub trait RtpWriter: Send + Sync {
    async fn write_rtp(&self, packet: &rtp::packet::Packet) -> Result<()>;
}

/// Deliver buffered candidates once the remote description is available.
/// All candidates are attempted; the first error is reported.
pub(crate) async fn flush_candidates(
    transport: &Arc<dyn PeerTransport>,
    candidates: Vec<IceCandidateInit>,
) -> Result<()> {
    let mut first_err = None;
    for candidate in candidates {
        if let Err(e) = transport.add_ice_candidate(candidate).await {
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
