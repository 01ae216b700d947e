//! End-to-end forwarding scenarios over in-memory transports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rtcp::payload_feedbacks::full_intra_request::{FirEntry, FullIntraRequest};
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use rtcp::receiver_report::ReceiverReport;
use rtcp::reception_report::ReceptionReport;
use rtcp::sender_report::SenderReport;
use tokio::sync::mpsc;
use webrtc_util::Marshal;

use sfu_forward::group::{Client, Group};
use sfu_forward::rtptime::{self, JIFFIES_PER_SEC};
use sfu_forward::{
    Codec, DownConnection, DownTrack, Error, IceCandidateInit, InboundTrack, PeerTransport,
    Result, RtcpPacket, RtcpReader, RtpReader, RtpWriter, SfuConfig, TrackKind, TransportState,
    UpConnection, UpTrack,
};

const SSRC: u32 = 0xCAFE;

#[derive(Default)]
struct MockTransport {
    sent: Mutex<Vec<RtcpPacket>>,
    closed: AtomicBool,
    has_remote: AtomicBool,
    candidates: Mutex<Vec<IceCandidateInit>>,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn as_dyn(self: &Arc<Self>) -> Arc<dyn PeerTransport> {
        self.clone()
    }

    fn sent(&self) -> Vec<RtcpPacket> {
        self.sent.lock().clone()
    }

    fn plis(&self) -> Vec<PictureLossIndication> {
        self.sent()
            .into_iter()
            .filter_map(|p| match p {
                RtcpPacket::PictureLossIndication(pli) => Some(pli),
                _ => None,
            })
            .collect()
    }

    fn fir_seqnos(&self) -> Vec<u8> {
        self.sent()
            .into_iter()
            .filter_map(|p| match p {
                RtcpPacket::FullIntraRequest(fir) => Some(fir.fir[0].sequence_number),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn write_rtcp(&self, packets: &[RtcpPacket]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::TransportClosed);
        }
        self.sent.lock().extend_from_slice(packets);
        Ok(())
    }

    fn state(&self) -> TransportState {
        if self.closed.load(Ordering::SeqCst) {
            TransportState::Closed
        } else {
            TransportState::Connected
        }
    }

    fn has_remote_description(&self) -> bool {
        self.has_remote.load(Ordering::SeqCst)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<()> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn add_recvonly_transceiver(&self, _kind: TrackKind) -> Result<()> {
        Ok(())
    }
}

struct ChanRtpReader {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl ChanRtpReader {
    fn new() -> (mpsc::UnboundedSender<Vec<u8>>, Arc<Self>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Arc::new(Self {
                rx: tokio::sync::Mutex::new(rx),
            }),
        )
    }
}

#[async_trait]
impl RtpReader for ChanRtpReader {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        match self.rx.lock().await.recv().await {
            Some(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            None => Err(Error::TransportClosed),
        }
    }
}

struct ChanRtcpReader {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl ChanRtcpReader {
    fn new() -> (mpsc::UnboundedSender<Bytes>, Arc<Self>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Arc::new(Self {
                rx: tokio::sync::Mutex::new(rx),
            }),
        )
    }
}

#[async_trait]
impl RtcpReader for ChanRtcpReader {
    async fn read(&self) -> Result<Bytes> {
        match self.rx.lock().await.recv().await {
            Some(data) => Ok(data),
            None => Err(Error::TransportClosed),
        }
    }
}

#[derive(Default)]
struct CollectWriter {
    packets: Mutex<Vec<rtp::packet::Packet>>,
}

impl CollectWriter {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn seqnos(&self) -> Vec<u16> {
        self.packets
            .lock()
            .iter()
            .map(|p| p.header.sequence_number)
            .collect()
    }
}

#[async_trait]
impl RtpWriter for CollectWriter {
    async fn write_rtp(&self, packet: &rtp::packet::Packet) -> Result<()> {
        self.packets.lock().push(packet.clone());
        Ok(())
    }
}

struct TestGroup {
    clients: Mutex<Vec<Arc<dyn Client>>>,
}

impl Group for TestGroup {
    fn get_clients(&self, exclude: Option<&str>) -> Vec<Arc<dyn Client>> {
        self.clients
            .lock()
            .iter()
            .filter(|c| Some(c.id()) != exclude)
            .cloned()
            .collect()
    }
}

struct TestClient {
    id: String,
    group: Arc<TestGroup>,
    pushes: Mutex<Vec<(String, usize, String)>>,
}

impl TestClient {
    fn new(id: &str, group: &Arc<TestGroup>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_owned(),
            group: group.clone(),
            pushes: Mutex::new(Vec::new()),
        })
    }
}

impl Client for TestClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn group(&self) -> Arc<dyn Group> {
        self.group.clone()
    }

    fn push_conn(
        &self,
        conn_id: &str,
        _up: Arc<UpConnection>,
        tracks: Vec<Arc<UpTrack>>,
        label: &str,
    ) {
        self.pushes
            .lock()
            .push((conn_id.to_owned(), tracks.len(), label.to_owned()));
    }
}

fn video_codec() -> Codec {
    Codec::new(TrackKind::Video, "video/VP8", 90_000)
        .with_feedback("nack", "")
        .with_feedback("nack", "pli")
        .with_feedback("ccm", "fir")
}

fn rtp_packet(seqno: u16, marker: bool) -> Vec<u8> {
    let packet = rtp::packet::Packet {
        header: rtp::header::Header {
            version: 2,
            payload_type: 96,
            sequence_number: seqno,
            timestamp: u32::from(seqno) * 3000,
            ssrc: SSRC,
            marker,
            ..Default::default()
        },
        payload: Bytes::from(vec![0xAB; 64]),
    };
    packet.marshal().unwrap().to_vec()
}

async fn wait_for<T>(mut check: impl FnMut() -> Option<T>) -> T {
    for _ in 0..300 {
        if let Some(value) = check() {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for condition");
}

struct Publisher {
    up: Arc<UpConnection>,
    transport: Arc<MockTransport>,
    track: Arc<UpTrack>,
    rtp_tx: mpsc::UnboundedSender<Vec<u8>>,
    rtcp_tx: mpsc::UnboundedSender<Bytes>,
}

async fn publisher(codec: Codec) -> Publisher {
    let transport = MockTransport::new();
    let up = UpConnection::new(
        "pub",
        "camera",
        transport.as_dyn(),
        Arc::new(SfuConfig::default()),
    )
    .await
    .unwrap();
    up.set_labels(HashMap::from([("0".to_owned(), "video".to_owned())]));

    let group = Arc::new(TestGroup {
        clients: Mutex::new(Vec::new()),
    });
    let client: Arc<dyn Client> = TestClient::new("pub", &group);

    let (rtp_tx, rtp_reader) = ChanRtpReader::new();
    let (rtcp_tx, rtcp_reader) = ChanRtcpReader::new();
    let track = up
        .handle_track(
            &client,
            InboundTrack {
                mid: Some("0".to_owned()),
                ssrc: SSRC,
                codec,
                rtp: rtp_reader,
                rtcp: rtcp_reader,
            },
        )
        .expect("track accepted");

    Publisher {
        up,
        transport,
        track,
        rtp_tx,
        rtcp_tx,
    }
}

struct Subscriber {
    down: Arc<DownConnection>,
    track: Arc<DownTrack>,
    transport: Arc<MockTransport>,
    writer: Arc<CollectWriter>,
    rtcp_tx: mpsc::UnboundedSender<Bytes>,
}

async fn subscriber(publisher: &Publisher, codec: Codec) -> Subscriber {
    let transport = MockTransport::new();
    let down = DownConnection::new("sub", transport.as_dyn(), publisher.up.clone());
    let writer = CollectWriter::new();
    let (rtcp_tx, rtcp_reader) = ChanRtcpReader::new();
    let track = down
        .add_track(
            SSRC,
            codec,
            writer.clone(),
            publisher.track.clone(),
            rtcp_reader,
        )
        .await;
    Subscriber {
        down,
        track,
        transport,
        writer,
        rtcp_tx,
    }
}

#[tokio::test]
async fn forwards_media_to_subscriber() {
    let publisher = publisher(video_codec()).await;
    let subscriber = subscriber(&publisher, video_codec()).await;

    for seqno in 1..=5u16 {
        publisher.rtp_tx.send(rtp_packet(seqno, false)).unwrap();
    }

    // the subscription command is picked up after the first packet, so
    // forwarding starts with the one that follows it
    wait_for(|| {
        let seqnos = subscriber.writer.seqnos();
        (seqnos.len() >= 4).then_some(())
    })
    .await;
    assert_eq!(subscriber.writer.seqnos(), vec![2, 3, 4, 5]);
}

#[tokio::test]
async fn nack_triggered_recovery() {
    let publisher = publisher(video_codec()).await;
    let subscriber = subscriber(&publisher, video_codec()).await;

    for seqno in 100..=130u16 {
        if (115..=117).contains(&seqno) {
            continue;
        }
        publisher.rtp_tx.send(rtp_packet(seqno, false)).unwrap();
    }

    let nack = wait_for(|| {
        publisher.transport.sent().into_iter().find_map(|p| match p {
            RtcpPacket::TransportLayerNack(nack) => Some(nack),
            _ => None,
        })
    })
    .await;
    assert_eq!(nack.media_ssrc, SSRC);
    assert_eq!(nack.nacks[0].packet_id, 115);
    assert_eq!(nack.nacks[0].packet_list(), vec![115, 116, 117]);

    // upstream answers the NACK
    for seqno in 115..=117u16 {
        publisher.rtp_tx.send(rtp_packet(seqno, false)).unwrap();
    }

    wait_for(|| {
        let seqnos = subscriber.writer.seqnos();
        ([115u16, 116, 117].iter().all(|s| seqnos.contains(s))).then_some(())
    })
    .await;
}

#[tokio::test]
async fn pli_is_rate_limited() {
    // pin the monotonic epoch, then move past the initial quota window
    rtptime::jiffies();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let publisher = publisher(video_codec()).await;
    let subscriber = subscriber(&publisher, video_codec()).await;

    let pli = RtcpPacket::PictureLossIndication(PictureLossIndication {
        sender_ssrc: 0,
        media_ssrc: SSRC,
    });
    let wire = pli.marshal().unwrap();

    subscriber.rtcp_tx.send(wire.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    subscriber.rtcp_tx.send(wire).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(publisher.transport.plis().len(), 1);
}

#[tokio::test]
async fn fir_seqno_discipline() {
    rtptime::jiffies();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let publisher = publisher(video_codec()).await;
    let subscriber = subscriber(&publisher, video_codec()).await;

    let fir = |seqno: u8| {
        RtcpPacket::FullIntraRequest(FullIntraRequest {
            sender_ssrc: 0,
            media_ssrc: SSRC,
            fir: vec![FirEntry {
                ssrc: SSRC,
                sequence_number: seqno,
            }],
        })
        .marshal()
        .unwrap()
    };

    subscriber.rtcp_tx.send(fir(7)).unwrap();
    wait_for(|| (publisher.transport.fir_seqnos().len() == 1).then_some(())).await;

    // same downstream seqno shortly after: no new request
    tokio::time::sleep(Duration::from_millis(50)).await;
    subscriber.rtcp_tx.send(fir(7)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(publisher.transport.fir_seqnos(), vec![1]);

    // a changed seqno after the quota window: counter advances and sends
    tokio::time::sleep(Duration::from_millis(150)).await;
    subscriber.rtcp_tx.send(fir(8)).unwrap();
    wait_for(|| (publisher.transport.fir_seqnos().len() == 2).then_some(())).await;
    assert_eq!(publisher.transport.fir_seqnos(), vec![1, 2]);
}

#[tokio::test]
async fn first_sender_report_propagates_downstream() {
    let publisher = publisher(video_codec()).await;
    let subscriber = subscriber(&publisher, video_codec()).await;

    let remote_rtp = 50_000u32;
    let remote_ntp = rtptime::system_time_to_ntp(
        SystemTime::now() - Duration::from_millis(500),
    );
    let sr = RtcpPacket::SenderReport(SenderReport {
        ssrc: SSRC,
        ntp_time: remote_ntp,
        rtp_time: remote_rtp,
        packet_count: 10,
        octet_count: 10_000,
        ..Default::default()
    });
    publisher.rtcp_tx.send(sr.marshal().unwrap()).unwrap();

    let down_sr = wait_for(|| {
        subscriber.transport.sent().into_iter().find_map(|p| match p {
            RtcpPacket::SenderReport(sr) => Some(sr),
            _ => None,
        })
    })
    .await;

    assert_eq!(down_sr.ssrc, SSRC);
    // the advertised RTP time extrapolates the publisher clock
    let elapsed = rtptime::ntp_to_system_time(down_sr.ntp_time)
        .duration_since(rtptime::ntp_to_system_time(remote_ntp))
        .unwrap();
    let expected =
        remote_rtp.wrapping_add(rtptime::from_duration(elapsed, 90_000) as u32);
    let diff = down_sr.rtp_time.abs_diff(expected);
    assert!(diff <= 90, "rtp time off by {diff} ticks");
}

#[tokio::test]
async fn upstream_report_carries_loss_and_remb() {
    let publisher = publisher(video_codec()).await;
    let _subscriber = subscriber(&publisher, video_codec()).await;

    for seqno in 1..=10u16 {
        if seqno == 5 {
            continue;
        }
        publisher.rtp_tx.send(rtp_packet(seqno, false)).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    publisher.up.send_upstream_rtcp().await.unwrap();

    let report = wait_for(|| {
        publisher.transport.sent().into_iter().find_map(|p| match p {
            RtcpPacket::ReceiverReport(rr) => rr.reports.first().cloned(),
            _ => None,
        })
    })
    .await;
    assert_eq!(report.ssrc, SSRC);
    assert_eq!(report.total_lost, 1);
    assert_eq!(report.fraction_lost, (256 / 10) as u8);
    assert_eq!(report.last_sequence_number, 10);

    let remb = publisher
        .transport
        .sent()
        .into_iter()
        .find_map(|p| match p {
            RtcpPacket::ReceiverEstimatedMaximumBitrate(remb) => Some(remb),
            _ => None,
        })
        .expect("REMB present");
    // the only subscriber has no feedback yet: video fallback applies
    assert_eq!(remb.bitrate as u64, 512 * 1024);
    assert_eq!(remb.ssrcs, vec![SSRC]);
}

#[tokio::test]
async fn loss_based_rate_follows_reported_loss() {
    let publisher = publisher(video_codec()).await;
    let subscriber = subscriber(&publisher, video_codec()).await;

    let report = |loss: u8| {
        RtcpPacket::ReceiverReport(ReceiverReport {
            ssrc: 0,
            reports: vec![ReceptionReport {
                ssrc: SSRC,
                fraction_lost: loss,
                ..Default::default()
            }],
            ..Default::default()
        })
        .marshal()
        .unwrap()
    };
    let budget = || subscriber.down.get_max_bitrate(rtptime::jiffies());

    // the first report resets the stale budget to the initial rate; the
    // sender is not saturating yet, so no probe
    subscriber.rtcp_tx.send(report(0)).unwrap();
    wait_for(|| (budget() == 512_000).then_some(())).await;

    // three loss-free reports with saturating traffic probe upward
    let mut expected = 512_000u64;
    for _ in 0..3 {
        subscriber.track.accumulate(120_000);
        tokio::time::sleep(Duration::from_millis(1_050)).await;
        subscriber.rtcp_tx.send(report(0)).unwrap();
        expected = expected * 269 / 256;
        wait_for(|| (budget() == expected).then_some(())).await;
    }

    // heavy loss backs off proportionally
    subscriber.rtcp_tx.send(report(30)).unwrap();
    expected = expected * (512 - 30) / 512;
    wait_for(|| (budget() == expected).then_some(())).await;

    // and recovery resumes probing
    subscriber.track.accumulate(120_000);
    tokio::time::sleep(Duration::from_millis(1_050)).await;
    subscriber.rtcp_tx.send(report(0)).unwrap();
    expected = expected * 269 / 256;
    wait_for(|| (budget() == expected).then_some(())).await;
}

#[tokio::test]
async fn cache_grows_to_cover_slow_subscribers() {
    let publisher = publisher(video_codec()).await;
    let near = subscriber(&publisher, video_codec()).await;
    let far = subscriber(&publisher, video_codec()).await;

    for seqno in 1..=400u16 {
        publisher.rtp_tx.send(rtp_packet(seqno, false)).unwrap();
    }
    wait_for(|| {
        let mut buf = [0u8; 1500];
        (publisher.track.get_rtp(400, &mut buf) > 0).then_some(())
    })
    .await;

    // an upstream sender report makes both subscribers emit their own,
    // stamping the timing the RTT correlation needs
    let sr = RtcpPacket::SenderReport(SenderReport {
        ssrc: SSRC,
        ntp_time: rtptime::system_time_to_ntp(SystemTime::now()),
        rtp_time: 1000,
        ..Default::default()
    });
    publisher.rtcp_tx.send(sr.marshal().unwrap()).unwrap();

    let lsr_of = |transport: &Arc<MockTransport>| {
        transport.sent().into_iter().find_map(|p| match p {
            RtcpPacket::SenderReport(sr) => Some((sr.ntp_time >> 16) as u32),
            _ => None,
        })
    };
    let near_lsr = wait_for(|| lsr_of(&near.transport)).await;
    let far_lsr = wait_for(|| lsr_of(&far.transport)).await;

    let report = |lsr: u32| {
        RtcpPacket::ReceiverReport(ReceiverReport {
            ssrc: 0,
            reports: vec![ReceptionReport {
                ssrc: SSRC,
                // 20 ms of interarrival jitter at 90 kHz
                jitter: 1800,
                last_sender_report: lsr,
                delay: 0,
                ..Default::default()
            }],
            ..Default::default()
        })
        .marshal()
        .unwrap()
    };

    // answer the sender reports roughly 100 ms and 300 ms later
    tokio::time::sleep(Duration::from_millis(100)).await;
    near.rtcp_tx.send(report(near_lsr)).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    far.rtcp_tx.send(report(far_lsr)).unwrap();

    wait_for(|| (far.track.rtt() > 0).then_some(())).await;
    assert!(near.track.rtt() >= JIFFIES_PER_SEC / 10);
    assert!(near.track.rtt() < JIFFIES_PER_SEC / 2);
    assert!(far.track.rtt() >= 3 * JIFFIES_PER_SEC / 10);
    assert!(far.track.rtt() < JIFFIES_PER_SEC);

    // let the rate window fill, then drive the per-second housekeeping
    tokio::time::sleep(Duration::from_millis(700)).await;
    publisher.up.send_upstream_rtcp().await.unwrap();

    // at a few hundred packets per second over the far subscriber's
    // window the cache clamps to its 256-packet maximum
    for seqno in 401..=700u16 {
        publisher.rtp_tx.send(rtp_packet(seqno, false)).unwrap();
    }
    wait_for(|| {
        let mut buf = [0u8; 1500];
        (publisher.track.get_rtp(700, &mut buf) > 0).then_some(())
    })
    .await;

    let mut buf = [0u8; 1500];
    // a 32-packet cache would only reach back to 669
    assert!(publisher.track.get_rtp(500, &mut buf) > 0);
    assert!(publisher.track.get_rtp(445, &mut buf) > 0);
    assert_eq!(publisher.track.get_rtp(420, &mut buf), 0);
}

#[tokio::test]
async fn subscriber_budget_uses_fallbacks() {
    let publisher = publisher(video_codec()).await;
    let subscriber = subscriber(&publisher, video_codec()).await;

    let now = rtptime::jiffies();
    // no REMB, no loss feedback: the per-track video fallback caps it
    assert_eq!(subscriber.down.get_max_bitrate(now), 512 * 1024);
}

#[tokio::test]
async fn ice_candidates_buffered_until_remote_description() {
    let transport = MockTransport::new();
    let up = UpConnection::new(
        "pub",
        "camera",
        transport.as_dyn(),
        Arc::new(SfuConfig::default()),
    )
    .await
    .unwrap();

    let first = IceCandidateInit {
        candidate: "candidate:1".to_owned(),
        ..Default::default()
    };
    let second = IceCandidateInit {
        candidate: "candidate:2".to_owned(),
        ..Default::default()
    };
    up.add_ice_candidate(first.clone()).await.unwrap();
    up.add_ice_candidate(second.clone()).await.unwrap();
    assert!(transport.candidates.lock().is_empty());

    transport.has_remote.store(true, Ordering::SeqCst);
    up.flush_ice_candidates().await.unwrap();
    assert_eq!(*transport.candidates.lock(), vec![first, second]);
}

#[tokio::test]
async fn publisher_announced_exactly_once() {
    let transport = MockTransport::new();
    let up = UpConnection::new(
        "pub",
        "camera",
        transport.as_dyn(),
        Arc::new(SfuConfig::default()),
    )
    .await
    .unwrap();
    up.set_labels(HashMap::from([
        ("0".to_owned(), "audio".to_owned()),
        ("1".to_owned(), "video".to_owned()),
    ]));

    let group = Arc::new(TestGroup {
        clients: Mutex::new(Vec::new()),
    });
    let peer = TestClient::new("peer", &group);
    group.clients.lock().push(peer.clone());
    let client: Arc<dyn Client> = TestClient::new("pub", &group);

    let inbound = |mid: &str, kind: TrackKind| {
        let (_tx, rtp) = ChanRtpReader::new();
        let (_ctx, rtcp) = ChanRtcpReader::new();
        let codec = match kind {
            TrackKind::Audio => Codec::new(kind, "audio/opus", 48_000),
            TrackKind::Video => Codec::new(kind, "video/VP8", 90_000),
        };
        InboundTrack {
            mid: Some(mid.to_owned()),
            ssrc: SSRC,
            codec,
            rtp,
            rtcp,
        }
    };

    up.handle_track(&client, inbound("0", TrackKind::Audio))
        .unwrap();
    assert!(peer.pushes.lock().is_empty());

    up.handle_track(&client, inbound("1", TrackKind::Video))
        .unwrap();
    assert_eq!(peer.pushes.lock().len(), 1);
    assert_eq!(peer.pushes.lock()[0].1, 2);

    // a replaced transceiver must not re-announce
    up.handle_track(&client, inbound("1", TrackKind::Video))
        .unwrap();
    assert_eq!(peer.pushes.lock().len(), 1);

    // and a track without a mid is refused outright
    let (_tx, rtp) = ChanRtpReader::new();
    let (_ctx, rtcp) = ChanRtcpReader::new();
    let refused = up.handle_track(
        &client,
        InboundTrack {
            mid: None,
            ssrc: SSRC,
            codec: Codec::new(TrackKind::Video, "video/VP8", 90_000),
            rtp,
            rtcp,
        },
    );
    assert!(refused.is_none());
}
