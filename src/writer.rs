//! Per-subscriber send workers.
//!
//! The ingest loop hands each stored packet to the pool, which fans it out
//! to one bounded queue per subscriber.  A slow subscriber loses packets;
//! it never slows ingest or its neighbours down.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use webrtc_util::Unmarshal;

use crate::down::DownTrack;
use crate::packetcache::{Cache, BUF_SIZE};
use crate::rtptime::{self, JIFFIES_PER_SEC};

const QUEUE_DEPTH: usize = 32;

/// What a writer needs to know about one stored packet.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PacketMeta {
    pub seqno: u16,
    pub index: u16,
    /// Inter-send pacing delay in jiffies.
    pub delay: u32,
    pub is_video: bool,
    pub marker: bool,
}

struct Writer {
    down: Arc<DownTrack>,
    tx: mpsc::Sender<PacketMeta>,
    handle: JoinHandle<()>,
}

/// The set of send workers attached to one inbound track.
pub(crate) struct WriterPool {
    cache: Arc<Cache>,
    writers: Vec<Writer>,
}

impl WriterPool {
    pub(crate) fn new(cache: Arc<Cache>) -> Self {
        Self {
            cache,
            writers: Vec::new(),
        }
    }

    /// Add a subscriber, spawning its worker.  Adding a subscriber twice
    /// is a no-op.
    pub(crate) fn add(&mut self, down: Arc<DownTrack>) {
        if self.writers.iter().any(|w| Arc::ptr_eq(&w.down, &down)) {
            return;
        }
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let handle = tokio::spawn(writer_task(down.clone(), self.cache.clone(), rx));
        self.writers.push(Writer { down, tx, handle });
        trace!(subscribers = self.writers.len(), "writer added");
    }

    /// Remove a subscriber.  Its worker drains and exits; removal of an
    /// unknown subscriber is a no-op.
    pub(crate) fn remove(&mut self, down: &Arc<DownTrack>) {
        self.writers.retain(|w| !Arc::ptr_eq(&w.down, down));
        trace!(subscribers = self.writers.len(), "writer removed");
    }

    /// Fan one packet out to every subscriber queue, dropping on overflow.
    pub(crate) fn write(&self, meta: PacketMeta) {
        for writer in &self.writers {
            if let Err(mpsc::error::TrySendError::Full(_)) = writer.tx.try_send(meta) {
                trace!(
                    ssrc = writer.down.ssrc(),
                    seqno = meta.seqno,
                    video = meta.is_video,
                    marker = meta.marker,
                    "subscriber queue full, dropping"
                );
            }
        }
    }

    /// Stop every worker.  Queued packets are still delivered.
    pub(crate) fn close(self) {
        for writer in self.writers {
            drop(writer.tx);
            drop(writer.handle);
        }
    }
}

async fn writer_task(down: Arc<DownTrack>, cache: Arc<Cache>, mut rx: mpsc::Receiver<PacketMeta>) {
    let mut buf = vec![0u8; BUF_SIZE];
    while let Some(meta) = rx.recv().await {
        let len = cache.get_at(meta.seqno, meta.index, &mut buf);
        if len == 0 {
            // slot reused before we got to it
            continue;
        }
        let packet = match rtp::packet::Packet::unmarshal(&mut &buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(seqno = meta.seqno, error = %e, "cached packet failed to parse");
                continue;
            }
        };
        match down.write_rtp(&packet).await {
            Ok(()) => down.accumulate(len as u32),
            Err(e) if e.is_terminal() => {
                debug!(ssrc = down.ssrc(), "subscriber transport closed");
                break;
            }
            Err(e) => {
                debug!(ssrc = down.ssrc(), error = %e, "write failed");
            }
        }
        if meta.delay > 0 {
            tokio::time::sleep(rtptime::to_duration(u64::from(meta.delay), JIFFIES_PER_SEC))
                .await;
        }
    }
}
