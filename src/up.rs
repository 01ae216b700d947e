//! Publisher side: inbound tracks, the ingest loop, and upstream RTCP.
//!
//! One [`UpConnection`] per publishing peer, one [`UpTrack`] per inbound
//! media stream.  Each track runs two tasks, an ingest reader and an RTCP
//! listener; the connection runs a 1 Hz sender for receiver reports and
//! REMB.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rtcp::reception_report::ReceptionReport;
use rtcp::receiver_report::ReceiverReport;
use rtcp::source_description::SdesType;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use webrtc_util::Unmarshal;

use crate::config::SfuConfig;
use crate::down::{DownConnection, DownTrack};
use crate::error::{Error, Result};
use crate::estimator::Estimator;
use crate::feedback;
use crate::group::Client;
use crate::jitter::Jitter;
use crate::packetcache::{Cache, BUF_SIZE};
use crate::rtcp::RtcpPacket;
use crate::rtptime::{self, JIFFIES_PER_SEC};
use crate::transport::{
    flush_candidates, IceCandidateInit, PeerTransport, RtcpReader, RtpReader, TransportState,
};
use crate::types::{Codec, Ssrc, TrackKind};
use crate::writer::{PacketMeta, WriterPool};

/// How far a fresh sequence number may run ahead of the NACK window
/// before we ask for retransmissions.
const NACK_TRIGGER_GAP: u16 = 24;

const INITIAL_CACHE_PACKETS: usize = 32;

pub(crate) enum TrackCommand {
    Add(Arc<DownTrack>),
    Remove(Arc<DownTrack>),
}

struct TrackState {
    cname: Option<String>,
    local: Vec<Weak<DownTrack>>,
    sr_time: u64,
    sr_ntp: u64,
    sr_rtp: u32,
}

/// One inbound media stream.
pub struct UpTrack {
    ssrc: Ssrc,
    codec: Codec,
    label: String,
    pub(crate) cache: Arc<Cache>,
    pub(crate) rate: Estimator,
    pub(crate) jitter: Jitter,
    last_pli: AtomicU64,
    last_fir: AtomicU64,
    fir_seqno: AtomicU32,
    local_tx: mpsc::Sender<TrackCommand>,
    local_rx: Mutex<Option<mpsc::Receiver<TrackCommand>>>,
    reader_done: CancellationToken,
    state: Mutex<TrackState>,
}

impl UpTrack {
    fn new(ssrc: Ssrc, codec: Codec, label: String) -> Arc<Self> {
        let (local_tx, local_rx) = mpsc::channel(2);
        Arc::new(Self {
            ssrc,
            cache: Arc::new(Cache::new(INITIAL_CACHE_PACKETS)),
            rate: Estimator::new(Duration::from_secs(1)),
            jitter: Jitter::new(codec.clock_rate),
            codec,
            label,
            last_pli: AtomicU64::new(0),
            last_fir: AtomicU64::new(0),
            fir_seqno: AtomicU32::new(0),
            local_tx,
            local_rx: Mutex::new(Some(local_rx)),
            reader_done: CancellationToken::new(),
            state: Mutex::new(TrackState {
                cname: None,
                local: Vec::new(),
                sr_time: 0,
                sr_ntp: 0,
                sr_rtp: 0,
            }),
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

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn cname(&self) -> Option<String> {
        self.state.lock().cname.clone()
    }

    /// Copy a cached packet for retransmission.  Returns 0 when it is no
    /// longer cached.
    pub fn get_rtp(&self, seqno: u16, buf: &mut [u8]) -> usize {
        self.cache.get(seqno, buf)
    }

    /// Subscribe a down track to this stream.  Idempotent.
    pub async fn add_local(&self, down: &Arc<DownTrack>) {
        {
            let mut state = self.state.lock();
            if state
                .local
                .iter()
                .any(|w| w.upgrade().is_some_and(|t| Arc::ptr_eq(&t, down)))
            {
                return;
            }
            state.local.push(Arc::downgrade(down));
        }
        self.notify_local(TrackCommand::Add(down.clone())).await;
    }

    /// Unsubscribe a down track.  Idempotent; returns whether it was
    /// subscribed.
    pub async fn del_local(&self, down: &Arc<DownTrack>) -> bool {
        let found = {
            let mut state = self.state.lock();
            let before = state.local.len();
            state
                .local
                .retain(|w| !w.upgrade().is_some_and(|t| Arc::ptr_eq(&t, down)));
            state.local.len() != before
        };
        if found {
            self.notify_local(TrackCommand::Remove(down.clone())).await;
        }
        found
    }

    /// Snapshot of the current subscribers, pruning dead references.
    #[must_use]
    pub fn get_local(&self) -> Vec<Arc<DownTrack>> {
        let mut state = self.state.lock();
        state.local.retain(|w| w.strong_count() > 0);
        state.local.iter().filter_map(Weak::upgrade).collect()
    }

    /// Tell the ingest loop about a subscriber change.  Races against
    /// reader shutdown so a late add or remove is a no-op, never a hang.
    async fn notify_local(&self, command: TrackCommand) {
        tokio::select! {
            _ = self.local_tx.send(command) => {}
            _ = self.reader_done.cancelled() => {}
        }
    }

    fn sr_timing(&self) -> (u64, u64, u32) {
        let state = self.state.lock();
        (state.sr_time, state.sr_ntp, state.sr_rtp)
    }

    /// The 8-bit FIR sequence number for the next request.  The counter
    /// must advance on `increment` even when the send is later dropped by
    /// the rate limit, so it is bumped before any checks.
    fn next_fir_seqno(&self, increment: bool) -> u8 {
        if increment {
            (self.fir_seqno.fetch_add(1, Ordering::Relaxed) + 1) as u8
        } else {
            self.fir_seqno.load(Ordering::Relaxed) as u8
        }
    }

    /// Grow or shrink the retransmission cache to cover the worst
    /// subscriber's retransmission window at the current packet rate.
    fn update_cache_size(&self, config: &SfuConfig, now: u64) {
        let clock_rate = u64::from(self.codec.clock_rate);
        let mut max_rto = 0u64;
        for down in self.get_local() {
            let (_, jitter_units) = down.stats_get(now);
            let jitter = u64::from(jitter_units) * (JIFFIES_PER_SEC / clock_rate);
            max_rto = max_rto.max(down.rtt() + 4 * jitter);
        }
        let (_, packet_rate) = self.rate.estimate();
        let packets = (u64::from(packet_rate) * max_rto * 4 / JIFFIES_PER_SEC) as usize;
        self.cache
            .resize_cond(packets.clamp(config.min_cache_packets, config.max_cache_packets));
    }
}

/// A newly negotiated inbound track, as delivered by the transport layer.
pub struct InboundTrack {
    pub mid: Option<String>,
    pub ssrc: Ssrc,
    pub codec: Codec,
    pub rtp: Arc<dyn RtpReader>,
    pub rtcp: Arc<dyn RtcpReader>,
}

struct ConnState {
    labels: HashMap<String, String>,
    mids_seen: HashSet<String>,
    tracks: Vec<Arc<UpTrack>>,
    local: Vec<Weak<DownConnection>>,
    ice_candidates: Vec<IceCandidateInit>,
}

/// One publishing peer.
pub struct UpConnection {
    id: String,
    label: String,
    transport: Arc<dyn PeerTransport>,
    config: Arc<SfuConfig>,
    pushed: AtomicBool,
    state: Mutex<ConnState>,
}

impl UpConnection {
    /// Create a publisher connection and its receive-only transceivers.
    pub async fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        transport: Arc<dyn PeerTransport>,
        config: Arc<SfuConfig>,
    ) -> Result<Arc<Self>> {
        transport.add_recvonly_transceiver(TrackKind::Audio).await?;
        transport.add_recvonly_transceiver(TrackKind::Video).await?;
        Ok(Arc::new(Self {
            id: id.into(),
            label: label.into(),
            transport,
            config,
            pushed: AtomicBool::new(false),
            state: Mutex::new(ConnState {
                labels: HashMap::new(),
                mids_seen: HashSet::new(),
                tracks: Vec::new(),
                local: Vec::new(),
                ice_candidates: Vec::new(),
            }),
        }))
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn config(&self) -> &Arc<SfuConfig> {
        &self.config
    }

    /// Install the mid-to-label map taken from the remote description.
    pub fn set_labels(&self, labels: HashMap<String, String>) {
        self.state.lock().labels = labels;
    }

    #[must_use]
    pub fn get_tracks(&self) -> Vec<Arc<UpTrack>> {
        self.state.lock().tracks.clone()
    }

    /// Register a subscribing connection.  Idempotent.
    pub fn add_local(&self, down: &Arc<DownConnection>) {
        let mut state = self.state.lock();
        if state
            .local
            .iter()
            .any(|w| w.upgrade().is_some_and(|c| Arc::ptr_eq(&c, down)))
        {
            return;
        }
        state.local.push(Arc::downgrade(down));
    }

    /// Deregister a subscribing connection.  Idempotent.
    pub fn del_local(&self, down: &Arc<DownConnection>) -> bool {
        let mut state = self.state.lock();
        let before = state.local.len();
        state
            .local
            .retain(|w| !w.upgrade().is_some_and(|c| Arc::ptr_eq(&c, down)));
        state.local.len() != before
    }

    pub(crate) fn get_local(&self) -> Vec<Arc<DownConnection>> {
        let mut state = self.state.lock();
        state.local.retain(|w| w.strong_count() > 0);
        state.local.iter().filter_map(Weak::upgrade).collect()
    }

    /// Queue or forward a remote ICE candidate depending on whether the
    /// remote description has been applied yet.
    pub async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<()> {
        if self.transport.has_remote_description() {
            return self.transport.add_ice_candidate(candidate).await;
        }
        self.state.lock().ice_candidates.push(candidate);
        Ok(())
    }

    /// Deliver all buffered candidates now that the description is set.
    pub async fn flush_ice_candidates(&self) -> Result<()> {
        let candidates = std::mem::take(&mut self.state.lock().ice_candidates);
        flush_candidates(&self.transport, candidates).await
    }

    /// Accept a new inbound track from the transport.  Starts its ingest
    /// and RTCP loops and, once every announced mid has arrived, publishes
    /// the connection to the other clients of the group (exactly once).
    pub fn handle_track(
        self: &Arc<Self>,
        client: &Arc<dyn Client>,
        inbound: InboundTrack,
    ) -> Option<Arc<UpTrack>> {
        let track = {
            let mut state = self.state.lock();
            let Some(mid) = inbound.mid else {
                warn!(ssrc = inbound.ssrc, "could not determine track mid");
                return None;
            };
            state.mids_seen.insert(mid.clone());
            let label = match state.labels.get(&mid) {
                Some(label) => label.clone(),
                None => {
                    warn!(ssrc = inbound.ssrc, mid = %mid, "no label for track mid");
                    inbound.codec.kind.default_label().to_owned()
                }
            };
            let track = UpTrack::new(inbound.ssrc, inbound.codec, label);
            state.tracks.push(track.clone());
            track
        };

        tokio::spawn(read_loop(self.clone(), track.clone(), inbound.rtp));
        tokio::spawn(rtcp_up_listener(self.clone(), track.clone(), inbound.rtcp));

        let (complete, tracks) = {
            let state = self.state.lock();
            let complete = state
                .labels
                .keys()
                .all(|mid| state.mids_seen.contains(mid));
            (complete, state.tracks.clone())
        };

        // the peer callbacks below may re-enter this connection, so the
        // lock is released before announcing
        if complete && !self.pushed.swap(true, Ordering::SeqCst) {
            info!(id = %self.id, tracks = tracks.len(), "announcing publisher");
            for peer in client.group().get_clients(Some(client.id())) {
                peer.push_conn(&self.id, self.clone(), tracks.clone(), &self.label);
            }
            tokio::spawn(rtcp_up_sender(self.clone()));
        }

        Some(track)
    }

    /// Request a keyframe through a picture-loss indication.
    pub async fn send_pli(&self, track: &Arc<UpTrack>) -> Result<()> {
        if !track.codec.supports_feedback("nack", "pli") {
            return Err(Error::UnsupportedFeedback);
        }
        if !feedback::check_rate_limit(&track.last_pli, rtptime::jiffies()) {
            return Err(Error::RateLimited);
        }
        self.transport
            .write_rtcp(&[feedback::pli(track.ssrc)])
            .await
    }

    /// Request a keyframe through a full intra request.  The FIR counter
    /// advances whenever `increment` is set, whether or not the request
    /// survives the capability and rate-limit checks.
    pub async fn send_fir(&self, track: &Arc<UpTrack>, increment: bool) -> Result<()> {
        let seqno = track.next_fir_seqno(increment);
        if !track.codec.supports_feedback("ccm", "fir") {
            return Err(Error::UnsupportedFeedback);
        }
        if !feedback::check_rate_limit(&track.last_fir, rtptime::jiffies()) {
            return Err(Error::RateLimited);
        }
        self.transport
            .write_rtcp(&[feedback::fir(track.ssrc, seqno)])
            .await
    }

    /// Ask for retransmission of a missing range.  A codec without NACK
    /// support makes this a silent no-op.
    pub(crate) async fn send_nack(
        &self,
        track: &Arc<UpTrack>,
        pivot: u16,
        bitmap: u16,
    ) -> Result<()> {
        if !track.codec.supports_feedback("nack", "") {
            return Ok(());
        }
        self.transport
            .write_rtcp(&[feedback::nack(track.ssrc, pivot, bitmap)])
            .await?;
        track.cache.expect(1 + bitmap.count_ones());
        Ok(())
    }

    /// Assemble and send the per-second receiver report plus REMB.
    pub async fn send_upstream_rtcp(&self) -> Result<()> {
        let now = rtptime::jiffies();
        let (tracks, locals) = {
            let mut state = self.state.lock();
            state.local.retain(|w| w.strong_count() > 0);
            (
                state.tracks.clone(),
                state
                    .local
                    .iter()
                    .filter_map(Weak::upgrade)
                    .collect::<Vec<_>>(),
            )
        };

        if tracks.is_empty() {
            if self.transport.state() == TransportState::Closed {
                return Err(Error::TransportClosed);
            }
            return Ok(());
        }

        let mut reports = Vec::with_capacity(tracks.len());
        for track in &tracks {
            track.update_cache_size(&self.config, now);
            let (mut expected, mut lost, total_lost, eseqno) = track.cache.get_stats(true);
            if expected == 0 {
                expected = 1;
            }
            if lost >= expected {
                lost = expected - 1;
            }
            let (sr_time, sr_ntp, _) = track.sr_timing();
            let delay = if sr_time != 0 {
                now.saturating_sub(sr_time) / (JIFFIES_PER_SEC / 0x10000)
            } else {
                0
            };
            reports.push(ReceptionReport {
                ssrc: track.ssrc,
                fraction_lost: ((lost * 256) / expected) as u8,
                total_lost,
                last_sequence_number: eseqno,
                jitter: track.jitter.jitter(),
                last_sender_report: (sr_ntp >> 16) as u32,
                delay: delay as u32,
            });
        }

        let mut packets = vec![RtcpPacket::ReceiverReport(ReceiverReport {
            ssrc: 0,
            reports,
            ..Default::default()
        })];

        let mut rate = u64::MAX;
        for down in &locals {
            rate = rate.min(down.get_max_bitrate(now));
        }
        if rate < self.config.min_bitrate {
            rate = self.config.min_bitrate;
        }

        // codecs that negotiate goog-remb carry their own estimate
        let ssrcs: Vec<Ssrc> = tracks
            .iter()
            .filter(|t| !t.codec.supports_feedback("goog-remb", ""))
            .map(|t| t.ssrc)
            .collect();
        if !ssrcs.is_empty() {
            packets.push(feedback::remb(rate, ssrcs));
        }

        self.transport.write_rtcp(&packets).await
    }
}

/// Ingest loop: one per inbound track.
async fn read_loop(conn: Arc<UpConnection>, track: Arc<UpTrack>, reader: Arc<dyn RtpReader>) {
    let Some(mut commands) = track.local_rx.lock().take() else {
        error!(ssrc = track.ssrc, "ingest loop started twice");
        return;
    };
    let mut writers = WriterPool::new(track.cache.clone());
    let is_video = track.codec.is_video();
    let mut buf = vec![0u8; BUF_SIZE];

    loop {
        let len = match reader.read(&mut buf).await {
            Ok(len) => len,
            Err(e) => {
                if !e.is_terminal() {
                    error!(ssrc = track.ssrc, error = %e, "track read failed");
                }
                break;
            }
        };
        track.rate.accumulate(len as u32);

        let packet = match rtp::packet::Packet::unmarshal(&mut &buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(ssrc = track.ssrc, error = %e, "dropping unparseable RTP");
                continue;
            }
        };
        track.jitter.accumulate(packet.header.timestamp);

        let seqno = packet.header.sequence_number;
        let (first, index) = track.cache.store(seqno, &buf[..len]);
        if seqno.wrapping_sub(first) > NACK_TRIGGER_GAP {
            if let Some((pivot, bitmap)) = track.cache.bitmap_get() {
                if let Err(e) = conn.send_nack(&track, pivot, bitmap).await {
                    debug!(ssrc = track.ssrc, error = %e, "nack failed");
                }
            }
        }

        // spread bursts over roughly half a packet interval
        let (_, packet_rate) = track.rate.estimate();
        let delay = if packet_rate > 512 {
            JIFFIES_PER_SEC as u32 / packet_rate / 2
        } else {
            (JIFFIES_PER_SEC / 1024) as u32
        };

        writers.write(PacketMeta {
            seqno,
            index,
            delay,
            is_video,
            marker: packet.header.marker,
        });

        loop {
            match commands.try_recv() {
                Ok(TrackCommand::Add(down)) => writers.add(down),
                Ok(TrackCommand::Remove(down)) => writers.remove(&down),
                Err(_) => break,
            }
        }
    }

    writers.close();
    track.reader_done.cancel();
    info!(ssrc = track.ssrc, "ingest loop ended");
}

/// Per-track RTCP listener on the receiver endpoint.
async fn rtcp_up_listener(
    conn: Arc<UpConnection>,
    track: Arc<UpTrack>,
    reader: Arc<dyn RtcpReader>,
) {
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

        let mut first_sr = false;
        for packet in packets {
            let local = track.get_local();
            match packet {
                RtcpPacket::SenderReport(sr) => {
                    {
                        let mut state = track.state.lock();
                        if state.sr_time == 0 {
                            first_sr = true;
                        }
                        state.sr_time = now;
                        state.sr_ntp = sr.ntp_time;
                        state.sr_rtp = sr.rtp_time;
                    }
                    for down in &local {
                        down.set_time_offset(sr.ntp_time, sr.rtp_time);
                    }
                }
                RtcpPacket::SourceDescription(sdes) => {
                    for chunk in &sdes.chunks {
                        if chunk.source != track.ssrc {
                            continue;
                        }
                        for item in &chunk.items {
                            if item.sdes_type != SdesType::SdesCname {
                                continue;
                            }
                            let cname = String::from_utf8_lossy(&item.text).into_owned();
                            track.state.lock().cname = Some(cname.clone());
                            for down in &local {
                                down.set_cname(&cname);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if first_sr {
            // propagate the clock offset downstream right away instead of
            // waiting for the one-second tick
            for down in conn.get_local() {
                if let Err(e) = down.send_sender_reports().await {
                    if !e.is_terminal() {
                        warn!(error = %e, "sender report failed");
                    }
                }
            }
        }
    }
}

/// 1 Hz upstream RTCP loop, one per publisher connection.
async fn rtcp_up_sender(conn: Arc<UpConnection>) {
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        match conn.send_upstream_rtcp().await {
            Ok(()) => {}
            Err(e) if e.is_terminal() => {
                info!(id = %conn.id, "upstream rtcp sender stopped");
                return;
            }
            Err(e) => warn!(id = %conn.id, error = %e, "receiver report failed"),
        }
    }
}
