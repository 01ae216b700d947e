//! RTCP feedback construction and rate limiting.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use rtcp::payload_feedbacks::full_intra_request::{FirEntry, FullIntraRequest};
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use rtcp::payload_feedbacks::receiver_estimated_maximum_bitrate::ReceiverEstimatedMaximumBitrate;
use rtcp::source_description::{
    SdesType, SourceDescription, SourceDescriptionChunk, SourceDescriptionItem,
};
use rtcp::transport_feedbacks::transport_layer_nack::{NackPair, TransportLayerNack};

use crate::rtcp::RtcpPacket;
use crate::rtptime::JIFFIES_PER_SEC;
use crate::types::Ssrc;

/// Minimum spacing between keyframe requests on one track.
pub const FEEDBACK_INTERVAL: u64 = JIFFIES_PER_SEC / 5;

/// Check a per-track feedback quota and, when the send is allowed, record
/// `now` as the last-sent time.  A `last` in the future means the clock
/// moved backwards; the send is allowed so feedback never stalls.
pub(crate) fn check_rate_limit(last: &AtomicU64, now: u64) -> bool {
    let prev = last.load(Ordering::Relaxed);
    if now >= prev && now - prev < FEEDBACK_INTERVAL {
        return false;
    }
    last.store(now, Ordering::Relaxed);
    true
}

pub(crate) fn pli(media_ssrc: Ssrc) -> RtcpPacket {
    RtcpPacket::PictureLossIndication(PictureLossIndication {
        sender_ssrc: 0,
        media_ssrc,
    })
}

pub(crate) fn fir(media_ssrc: Ssrc, seqno: u8) -> RtcpPacket {
    RtcpPacket::FullIntraRequest(FullIntraRequest {
        sender_ssrc: 0,
        media_ssrc,
        fir: vec![FirEntry {
            ssrc: media_ssrc,
            sequence_number: seqno,
        }],
    })
}

pub(crate) fn nack(media_ssrc: Ssrc, pivot: u16, bitmap: u16) -> RtcpPacket {
    RtcpPacket::TransportLayerNack(TransportLayerNack {
        sender_ssrc: 0,
        media_ssrc,
        nacks: vec![NackPair {
            packet_id: pivot,
            lost_packets: bitmap,
        }],
    })
}

pub(crate) fn remb(bitrate: u64, ssrcs: Vec<Ssrc>) -> RtcpPacket {
    RtcpPacket::ReceiverEstimatedMaximumBitrate(ReceiverEstimatedMaximumBitrate {
        sender_ssrc: 0,
        bitrate: bitrate as f32,
        ssrcs,
    })
}

pub(crate) fn sdes_cname(ssrc: Ssrc, cname: &str) -> RtcpPacket {
    RtcpPacket::SourceDescription(SourceDescription {
        chunks: vec![SourceDescriptionChunk {
            source: ssrc,
            items: vec![SourceDescriptionItem {
                sdes_type: SdesType::SdesCname,
                text: Bytes::copy_from_slice(cname.as_bytes()),
            }],
        }],
    })
}
