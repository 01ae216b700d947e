//! Tagged RTCP packet type.
//!
//! The wire structs come from the `rtcp` crate; this module wraps the
//! variants the forwarder speaks in one enum so listeners can dispatch
//! with an exhaustive match instead of downcasting boxed packets.

use bytes::{Buf, Bytes};
use rtcp::header::{Header, PacketType, FORMAT_FIR, FORMAT_PLI, FORMAT_REMB, FORMAT_TLN};
use rtcp::payload_feedbacks::full_intra_request::FullIntraRequest;
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use rtcp::payload_feedbacks::receiver_estimated_maximum_bitrate::ReceiverEstimatedMaximumBitrate;
use rtcp::receiver_report::ReceiverReport;
use rtcp::sender_report::SenderReport;
use rtcp::source_description::SourceDescription;
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use webrtc_util::{Marshal, Unmarshal};

use crate::error::{Error, Result};

const HEADER_LEN: usize = 4;

/// One RTCP packet of a kind the forwarder understands.
#[derive(Debug, Clone, PartialEq)]
pub enum RtcpPacket {
    SenderReport(SenderReport),
    ReceiverReport(ReceiverReport),
    SourceDescription(SourceDescription),
    PictureLossIndication(PictureLossIndication),
    FullIntraRequest(FullIntraRequest),
    TransportLayerNack(TransportLayerNack),
    ReceiverEstimatedMaximumBitrate(ReceiverEstimatedMaximumBitrate),
    /// Anything else; carried so compound parsing can skip it.
    Other(Header),
}

impl RtcpPacket {
    /// Parse a compound RTCP datagram into individual packets.
    pub fn parse_compound(mut buf: Bytes) -> Result<Vec<RtcpPacket>> {
        let mut packets = Vec::new();
        while buf.remaining() > 0 {
            if buf.remaining() < HEADER_LEN {
                return Err(Error::Malformed(webrtc_util::Error::Other(
                    "truncated RTCP header".to_owned(),
                )));
            }
            let header = Header::unmarshal(&mut buf.clone())?;
            let len = usize::from(header.length) * 4 + HEADER_LEN;
            if buf.remaining() < len {
                return Err(Error::Malformed(webrtc_util::Error::Other(
                    "truncated RTCP packet".to_owned(),
                )));
            }
            let mut raw = buf.copy_to_bytes(len);
            packets.push(Self::unmarshal_one(&header, &mut raw)?);
        }
        Ok(packets)
    }

    fn unmarshal_one(header: &Header, raw: &mut Bytes) -> Result<RtcpPacket> {
        let packet = match header.packet_type {
            PacketType::SenderReport => Self::SenderReport(SenderReport::unmarshal(raw)?),
            PacketType::ReceiverReport => Self::ReceiverReport(ReceiverReport::unmarshal(raw)?),
            PacketType::SourceDescription => {
                Self::SourceDescription(SourceDescription::unmarshal(raw)?)
            }
            PacketType::TransportSpecificFeedback if header.count == FORMAT_TLN => {
                Self::TransportLayerNack(TransportLayerNack::unmarshal(raw)?)
            }
            PacketType::PayloadSpecificFeedback => match header.count {
                FORMAT_PLI => {
                    Self::PictureLossIndication(PictureLossIndication::unmarshal(raw)?)
                }
                FORMAT_FIR => Self::FullIntraRequest(FullIntraRequest::unmarshal(raw)?),
                FORMAT_REMB => Self::ReceiverEstimatedMaximumBitrate(
                    ReceiverEstimatedMaximumBitrate::unmarshal(raw)?,
                ),
                _ => Self::Other(header.clone()),
            },
            _ => Self::Other(header.clone()),
        };
        Ok(packet)
    }

    /// Serialize this packet to wire format.
    pub fn marshal(&self) -> Result<Bytes> {
        let bytes = match self {
            Self::SenderReport(p) => p.marshal()?,
            Self::ReceiverReport(p) => p.marshal()?,
            Self::SourceDescription(p) => p.marshal()?,
            Self::PictureLossIndication(p) => p.marshal()?,
            Self::FullIntraRequest(p) => p.marshal()?,
            Self::TransportLayerNack(p) => p.marshal()?,
            Self::ReceiverEstimatedMaximumBitrate(p) => p.marshal()?,
            Self::Other(_) => {
                return Err(Error::Malformed(webrtc_util::Error::Other(
                    "cannot marshal an unsupported RTCP packet".to_owned(),
                )))
            }
        };
        Ok(bytes)
    }

    /// Serialize a compound packet.
    pub fn marshal_compound(packets: &[RtcpPacket]) -> Result<Bytes> {
        let mut out = Vec::new();
        for packet in packets {
            out.extend_from_slice(&packet.marshal()?);
        }
        Ok(Bytes::from(out))
    }
}
