//! Subscriber side: outbound tracks, quality feedback, and sender reports.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use rtcp::reception_report::ReceptionReport;
use rtcp::sender_report::SenderReport;
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use tracing::{debug, error, info, warn};
use webrtc_util::Unmarshal;

use crate::error::{Error, Result};
use crate::estimator::Estimator;
use crate::feedback;
use crate::packetcache::BUF_SIZE;
use crate::rtcp::RtcpPacket;
use crate::rtptime::{self, JIFFIES_PER_SEC};
use crate::stats::{Bitrate, ReceiverStats, RECEIVER_REPORT_TIMEOUT};
use crate::transport::{
    flush_candidates, IceCandidateInit, PeerTransport, RtcpReader, RtpWriter, TransportState,
};
use crate::types::{Codec, Ssrc, TrackKind};
use crate::up::{UpConnection, UpTrack};

// loss-based controller bounds, fraction_lost in Q0.8
const MIN_LOSS_RATE: u64 = 9600;
const INIT_LOSS_RATE: u64 = 512 * 1000;
const MAX_LOSS_RATE: u64 = 1 << 30;

/// One outbound media stream to a subscriber.
pub struct DownTrack {
    ssrc: Ssrc,
    codec: Codec,
    writer: Arc<dyn RtpWriter>,
    remote: Arc<UpTrack>,
    pub(crate) max_bitrate: Bitrate,
    rate: Estimator,
    stats: ReceiverStats,
    sr_time: AtomicU64,
    sr_ntp: AtomicU64,
    remote_ntp: AtomicU64,
    remote_rtp: AtomicU32,
    cname: RwLock<Option<String>>,
    rtt: AtomicU64,
}

impl DownTrack {
    #[must_use]
    pub fn new(
        ssrc: Ssrc,
        codec: Codec,
        writer: Arc<dyn RtpWriter>,
        remote: Arc<UpTrack>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ssrc,
            codec,
            writer,
            remote,
            max_bitrate: Bitrate::new(),
            rate: Estimator::new(Duration::from_secs(1)),
            stats: ReceiverStats::new(),
            sr_time: AtomicU64::new(0),
            sr_ntp: AtomicU64::new(0),
            remote_ntp: AtomicU64::new(0),
            remote_rtp: AtomicU32::new(0),
            cname: RwLock::new(None),
            rtt: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn ssrc(&self) -> Ssrc {
        self.ssrc
    }

    #[must_use]
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// The inbound track this subscription forwards.
    #[must_use]
    pub fn remote(&self) -> &Arc<UpTrack> {
        &self.remote
    }

    pub async fn write_rtp(&self, packet: &rtp::packet::Packet) -> Result<()> {
        self.writer.write_rtp(packet).await
    }

    /// Count outbound bytes towards this subscriber's rate estimate.
    pub fn accumulate(&self, bytes: u32) {
        self.rate.accumulate(bytes);
    }

    /// Record the publisher's NTP/RTP clock correspondence.
    pub fn set_time_offset(&self, ntp: u64, rtp: u32) {
        self.remote_ntp.store(ntp, Ordering::Relaxed);
        self.remote_rtp.store(rtp, Ordering::Relaxed);
    }

    pub fn set_cname(&self, cname: &str) {
        *self.cname.write() = Some(cname.to_owned());
    }

    #[must_use]
    pub fn cname(&self) -> Option<String> {
        self.cname.read().clone()
    }

    /// Smoothed RTT to this subscriber, in jiffies.
    #[must_use]
    pub fn rtt(&self) -> u64 {
        self.rtt.load(Ordering::Relaxed)
    }

    pub(crate) fn stats_get(&self, now: u64) -> (u8, u32) {
        self.stats.get(now)
    }

    #[cfg(test)]
    pub(crate) fn testing_set_quality(&self, rtt: u64, loss: u8, jitter: u32, now: u64) {
        self.rtt.store(rtt, Ordering::Relaxed);
        self.stats.set(loss, jitter, now);
    }

    /// Loss-based AIMD: probe up by ~5% when under 2% loss and actually
    /// saturating the budget, back off proportionally above 10% loss.
    pub(crate) fn update_rate(&self, loss: u8, now: u64) {
        let mut rate = self.max_bitrate.get(now);
        if !(MIN_LOSS_RATE..=MAX_LOSS_RATE).contains(&rate) {
            // no recent feedback
            rate = INIT_LOSS_RATE;
        }
        if loss < 5 {
            // a sender far below its budget is not probing the bottleneck
            let (byte_rate, _) = self.rate.estimate();
            let actual = 8 * u64::from(byte_rate);
            if actual >= rate * 7 / 8 {
                rate = (rate * 269 / 256).min(MAX_LOSS_RATE);
            }
        } else if loss > 25 {
            rate = (rate * (512 - u64::from(loss)) / 512).max(MIN_LOSS_RATE);
        }

        // set unconditionally to refresh the staleness timestamp
        self.max_bitrate.set(rate, now);
    }

    /// Digest one reception report about this track: loss and jitter
    /// snapshot, rate controller, and RTT from the LSR/DLSR correlation.
    pub(crate) fn handle_report(&self, report: &ReceptionReport, now: u64) {
        self.stats.set(report.fraction_lost, report.jitter, now);
        self.update_rate(report.fraction_lost, now);

        if report.last_sender_report == 0 {
            return;
        }
        let sr_time = self.sr_time.load(Ordering::Relaxed);
        if now < sr_time || now - sr_time > RECEIVER_REPORT_TIMEOUT {
            return;
        }
        let sr_ntp = self.sr_ntp.load(Ordering::Relaxed);
        if report.last_sender_report != (sr_ntp >> 16) as u32 {
            return;
        }
        let delay = u64::from(report.delay) * (JIFFIES_PER_SEC / 0x10000);
        if delay > now - sr_time {
            // impossible timing, assume clock skew
            return;
        }
        let sample = (now - sr_time) - delay;
        let prev = self.rtt.load(Ordering::Relaxed);
        let next = if prev > 0 { (3 * prev + sample) / 4 } else { sample };
        self.rtt.store(next, Ordering::Relaxed);
    }
}

struct ConnState {
    tracks: Vec<Arc<DownTrack>>,
    ice_candidates: Vec<IceCandidateInit>,
}

/// One subscribing peer, holding its outbound tracks.
pub struct DownConnection {
    id: String,
    transport: Arc<dyn PeerTransport>,
    remote: Arc<UpConnection>,
    pub(crate) max_remb_bitrate: Bitrate,
    state: Mutex<ConnState>,
}

impl DownConnection {
    /// Create a subscriber connection for `remote` and register it there.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        transport: Arc<dyn PeerTransport>,
        remote: Arc<UpConnection>,
    ) -> Arc<Self> {
        let conn = Arc::new(Self {
            id: id.into(),
            transport,
            remote,
            max_remb_bitrate: Bitrate::new(),
            state: Mutex::new(ConnState {
                tracks: Vec::new(),
                ice_candidates: Vec::new(),
            }),
        });
        conn.remote.add_local(&conn);
        conn
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn remote(&self) -> &Arc<UpConnection> {
        &self.remote
    }

    #[must_use]
    pub fn get_tracks(&self) -> Vec<Arc<DownTrack>> {
        self.state.lock().tracks.clone()
    }

    /// Subscribe to one upstream track.  The returned track is wired into
    /// the publisher's fan-out and its RTCP listener is started.
    pub async fn add_track(
        self: &Arc<Self>,
        ssrc: Ssrc,
        codec: Codec,
        writer: Arc<dyn RtpWriter>,
        remote_track: Arc<UpTrack>,
        rtcp: Arc<dyn RtcpReader>,
    ) -> Arc<DownTrack> {
        let track = DownTrack::new(ssrc, codec, writer, remote_track.clone());
        self.state.lock().tracks.push(track.clone());
        remote_track.add_local(&track).await;
        tokio::spawn(rtcp_down_listener(self.clone(), track.clone(), rtcp));
        track
    }

    /// Unsubscribe one track.  Idempotent.
    pub async fn remove_track(&self, track: &Arc<DownTrack>) -> bool {
        self.state
            .lock()
            .tracks
            .retain(|t| !Arc::ptr_eq(t, track));
        track.remote().del_local(track).await
    }

    /// Detach from the publisher.  Idempotent.
    pub fn close(self: &Arc<Self>) {
        self.remote.del_local(self);
    }

    /// Start the 1 Hz sender-report loop.
    pub fn start(self: &Arc<Self>) {
        tokio::spawn(rtcp_down_sender(self.clone()));
    }

    /// The bitrate budget for this subscriber: the REMB it reported,
    /// capped by the per-track controller outputs (with configured
    /// fallbacks for tracks without recent feedback).
    #[must_use]
    pub fn get_max_bitrate(&self, now: u64) -> u64 {
        let rate = self.max_remb_bitrate.get(now);
        let config = self.remote.config();
        let tracks = self.state.lock().tracks.clone();
        let mut track_rate: u64 = 0;
        for track in &tracks {
            let r = match track.max_bitrate.get(now) {
                u64::MAX => match track.codec.kind {
                    TrackKind::Audio => config.audio_fallback_bitrate,
                    TrackKind::Video => config.video_fallback_bitrate,
                },
                r => r,
            };
            track_rate += r;
        }
        track_rate.min(rate)
    }

    pub async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<()> {
        if self.transport.has_remote_description() {
            return self.transport.add_ice_candidate(candidate).await;
        }
        self.state.lock().ice_candidates.push(candidate);
        Ok(())
    }

    pub async fn flush_ice_candidates(&self) -> Result<()> {
        let candidates = std::mem::take(&mut self.state.lock().ice_candidates);
        flush_candidates(&self.transport, candidates).await
    }

    /// Emit a sender report (plus SDES) for every track that has seen
    /// upstream timing, so the subscriber can line up clocks.
    pub async fn send_sender_reports(&self) -> Result<()> {
        let now_wall = SystemTime::now();
        let now_ntp = rtptime::system_time_to_ntp(now_wall);
        let now_jiffies = rtptime::jiffies();
        let tracks = self.state.lock().tracks.clone();

        let mut packets = Vec::with_capacity(tracks.len());
        for track in &tracks {
            let remote_ntp = track.remote_ntp.load(Ordering::Relaxed);
            let remote_rtp = track.remote_rtp.load(Ordering::Relaxed);
            if remote_ntp != 0 {
                let mut now_rtp = 0u32;
                if let Ok(d) =
                    now_wall.duration_since(rtptime::ntp_to_system_time(remote_ntp))
                {
                    if d > Duration::ZERO && d < Duration::from_secs(3600) {
                        let elapsed =
                            rtptime::from_duration(d, u64::from(track.codec.clock_rate));
                        now_rtp = remote_rtp.wrapping_add(elapsed as u32);
                    }
                }
                let (packet_count, octet_count) = track.rate.totals();
                packets.push(RtcpPacket::SenderReport(SenderReport {
                    ssrc: track.ssrc,
                    ntp_time: now_ntp,
                    rtp_time: now_rtp,
                    packet_count,
                    octet_count,
                    ..Default::default()
                }));
                track.sr_time.store(now_jiffies, Ordering::Relaxed);
                track.sr_ntp.store(now_ntp, Ordering::Relaxed);
            }

            if let Some(cname) = track.cname() {
                packets.push(feedback::sdes_cname(track.ssrc, &cname));
            }
        }

        if packets.is_empty() {
            if self.transport.state() == TransportState::Closed {
                return Err(Error::TransportClosed);
            }
            return Ok(());
        }
        self.transport.write_rtcp(&packets).await
    }
}

/// Replay cached upstream packets that a subscriber reported missing.
async fn send_recovery(nack: &TransportLayerNack, track: &Arc<DownTrack>) {
    let mut buf = vec![0u8; BUF_SIZE];
    for pair in &nack.nacks {
        for seqno in pair.packet_list() {
            let len = track.remote().get_rtp(seqno, &mut buf);
            if len == 0 {
                continue;
            }
            let packet = match rtp::packet::Packet::unmarshal(&mut &buf[..len]) {
                Ok(packet) => packet,
                Err(_) => continue,
            };
            match track.write_rtp(&packet).await {
                Ok(()) => track.accumulate(len as u32),
                Err(e) => {
                    debug!(ssrc = track.ssrc, seqno, error = %e, "retransmission failed");
                    if e.is_terminal() {
                        return;
                    }
                }
            }
        }
    }
}

/// Per-track RTCP listener on the sender endpoint.
async fn rtcp_down_listener(
    conn: Arc<DownConnection>,
    track: Arc<DownTrack>,
    reader: Arc<dyn RtcpReader>,
) {
    let mut got_fir = false;
    let mut last_fir_seqno = 0u8;

    loop {
        let data = match reader.read().await {
            Ok(data) => data,
            Err(e) => {
                if !e.is_terminal() {
                    error!(ssrc = track.ssrc, error = %e, "rtcp read failed");
                }
                return;
            }
        };
        let now = rtptime::jiffies();
        let packets = match RtcpPacket::parse_compound(data) {
            Ok(packets) => packets,
            Err(e) => {
                debug!(ssrc = track.ssrc, error = %e, "dropping unparseable RTCP");
                continue;
            }
        };

        for packet in packets {
            match packet {
                RtcpPacket::PictureLossIndication(_) => {
                    match conn.remote.send_pli(track.remote()).await {
                        Ok(()) | Err(Error::RateLimited) => {}
                        Err(e) => warn!(ssrc = track.ssrc, error = %e, "pli relay failed"),
                    }
                }
                RtcpPacket::FullIntraRequest(fir) => {
                    let Some(entry) = fir.fir.iter().find(|e| e.ssrc == track.ssrc) else {
                        debug!(ssrc = track.ssrc, "misdirected FIR");
                        continue;
                    };
                    // only a changed downstream seqno is a new request
                    let increment = !got_fir || entry.sequence_number != last_fir_seqno;
                    got_fir = true;
                    last_fir_seqno = entry.sequence_number;
                    match conn.remote.send_fir(track.remote(), increment).await {
                        Ok(()) | Err(Error::RateLimited) => {}
                        Err(Error::UnsupportedFeedback) => {
                            match conn.remote.send_pli(track.remote()).await {
                                Ok(()) | Err(Error::RateLimited) => {}
                                Err(e) => {
                                    warn!(ssrc = track.ssrc, error = %e, "pli fallback failed");
                                }
                            }
                        }
                        Err(e) => warn!(ssrc = track.ssrc, error = %e, "fir relay failed"),
                    }
                }
                RtcpPacket::ReceiverEstimatedMaximumBitrate(remb) => {
                    conn.max_remb_bitrate.set(remb.bitrate as u64, now);
                }
                RtcpPacket::ReceiverReport(rr) => {
                    for report in &rr.reports {
                        if report.ssrc == track.ssrc {
                            track.handle_report(report, now);
                        }
                    }
                }
                RtcpPacket::SenderReport(sr) => {
                    for report in &sr.reports {
                        if report.ssrc == track.ssrc {
                            track.handle_report(report, now);
                        }
                    }
                }
                RtcpPacket::TransportLayerNack(nack) => {
                    send_recovery(&nack, &track).await;
                }
                RtcpPacket::SourceDescription(_) | RtcpPacket::Other(_) => {}
            }
        }
    }
}

/// 1 Hz sender-report loop, one per subscriber connection.
async fn rtcp_down_sender(conn: Arc<DownConnection>) {
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        match conn.send_sender_reports().await {
            Ok(()) => {}
            Err(e) if e.is_terminal() => {
                info!(id = %conn.id, "sender report loop stopped");
                return;
            }
            Err(e) => warn!(id = %conn.id, error = %e, "sender report failed"),
        }
    }
}
