//! Retransmission cache for inbound RTP.
//!
//! A ring buffer of recent packets keyed by 16-bit sequence number, plus
//! the bookkeeping the feedback loops need: a sliding bitmap of recently
//! received sequence numbers for NACK generation, and expected/lost
//! counters for receiver reports.  All sequence arithmetic is serial
//! (modulo 2^16).

use parking_lot::Mutex;

/// Largest RTP packet the cache will hold.
pub const BUF_SIZE: usize = 1500;

/// Half the sequence space; differences below this mean "ahead".
const SEQNO_AHEAD: u16 = 0x8000;

#[derive(Debug, Default, Clone)]
struct Entry {
    seqno: u16,
    len: u16,
    data: Vec<u8>,
}

#[derive(Debug)]
struct Inner {
    entries: Vec<Entry>,
    position: usize,

    // sliding window of received seqnos; bit i stands for first + i
    first: u16,
    bitmap: u32,

    // receiver-report accounting
    initialized: bool,
    last_seqno: u16,
    cycles: u32,
    expected: u32,
    lost: u32,
    total_lost: u32,
}

/// Seqno-indexed packet cache with NACK-bitmap queries.
#[derive(Debug)]
pub struct Cache {
    inner: Mutex<Inner>,
}

impl Cache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: vec![Entry::default(); capacity.max(1)],
                position: 0,
                first: 0,
                bitmap: 0,
                initialized: false,
                last_seqno: 0,
                cycles: 0,
                expected: 0,
                lost: 0,
                total_lost: 0,
            }),
        }
    }

    /// Store one packet.  Returns the first sequence number of the
    /// NACK window and the ring index the packet landed in.
    pub fn store(&self, seqno: u16, data: &[u8]) -> (u16, u16) {
        let mut inner = self.inner.lock();

        inner.account(seqno);
        inner.mark_received(seqno);

        let len = data.len().min(BUF_SIZE);
        let position = inner.position;
        let entry = &mut inner.entries[position];
        entry.seqno = seqno;
        entry.len = len as u16;
        entry.data.clear();
        entry.data.extend_from_slice(&data[..len]);
        inner.position = (position + 1) % inner.entries.len();

        (inner.first, position as u16)
    }

    /// Copy the packet with the given sequence number into `buf`.
    /// Returns 0 when the packet is no longer cached.
    pub fn get(&self, seqno: u16, buf: &mut [u8]) -> usize {
        let inner = self.inner.lock();
        for entry in &inner.entries {
            if entry.len > 0 && entry.seqno == seqno {
                return copy_entry(entry, buf);
            }
        }
        0
    }

    /// Copy the packet at a known ring index, validating the sequence
    /// number.  Returns 0 when the slot has been overwritten since.
    pub fn get_at(&self, seqno: u16, index: u16, buf: &mut [u8]) -> usize {
        let inner = self.inner.lock();
        match inner.entries.get(index as usize) {
            Some(entry) if entry.len > 0 && entry.seqno == seqno => copy_entry(entry, buf),
            _ => 0,
        }
    }

    /// Consume the NACK window.  Returns the earliest missing sequence
    /// number and a bitmap marking which of the 16 following ones are
    /// also missing, or `None` when the window has no holes.
    pub fn bitmap_get(&self) -> Option<(u16, u16)> {
        let mut inner = self.inner.lock();

        // drop leading received packets, they need no feedback
        while inner.bitmap & 1 == 1 {
            inner.bitmap >>= 1;
            inner.first = inner.first.wrapping_add(1);
        }
        if inner.bitmap == 0 {
            return None;
        }

        let pivot = inner.first;
        let head = 31 - inner.bitmap.leading_zeros() as u16;
        let mut bitmap = 0u16;
        for k in 1..=16u16 {
            if k < head && inner.bitmap & (1 << k) == 0 {
                bitmap |= 1 << (k - 1);
            }
        }

        // consume pivot and the 16 seqnos the bitmap covered
        inner.bitmap >>= 17;
        inner.first = inner.first.wrapping_add(17);

        Some((pivot, bitmap))
    }

    /// Announce `n` pending retransmissions so they are not counted as
    /// fresh traffic by the loss statistics.
    pub fn expect(&self, n: u32) {
        let mut inner = self.inner.lock();
        inner.expected += n;
    }

    /// Receiver-report statistics:
    /// `(expected, lost, total_lost, extended_seqno)`.  With `reset`, the
    /// interval counters start over.
    pub fn get_stats(&self, reset: bool) -> (u32, u32, u32, u32) {
        let mut inner = self.inner.lock();
        let stats = (
            inner.expected,
            inner.lost,
            inner.total_lost,
            (inner.cycles << 16) | u32::from(inner.last_seqno),
        );
        if reset {
            inner.expected = 0;
            inner.lost = 0;
        }
        stats
    }

    /// Current capacity in packets.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Resize to `capacity` packets, keeping the most recent contents.
    pub fn resize(&self, capacity: usize) {
        let mut inner = self.inner.lock();
        inner.resize(capacity.max(1));
    }

    /// Resize only when the current capacity is far enough from the
    /// wanted one to matter; small oscillations keep the cache intact.
    pub fn resize_cond(&self, capacity: usize) -> bool {
        let capacity = capacity.max(1);
        let mut inner = self.inner.lock();
        let current = inner.entries.len();
        if current >= capacity * 3 / 4 && current <= capacity * 2 {
            return false;
        }
        inner.resize(capacity);
        true
    }
}

impl Inner {
    /// Update expected/lost counters for a freshly stored packet.
    fn account(&mut self, seqno: u16) {
        if !self.initialized {
            self.initialized = true;
            self.last_seqno = seqno;
            self.expected += 1;
            return;
        }
        let delta = seqno.wrapping_sub(self.last_seqno);
        if delta == 0 {
            return;
        }
        if delta < SEQNO_AHEAD {
            self.expected += u32::from(delta);
            if delta > 1 {
                self.lost += u32::from(delta) - 1;
                self.total_lost += u32::from(delta) - 1;
            }
            if seqno < self.last_seqno {
                self.cycles += 1;
            }
            self.last_seqno = seqno;
        } else {
            // a late packet fills a hole counted as lost
            self.lost = self.lost.saturating_sub(1);
            self.total_lost = self.total_lost.saturating_sub(1);
        }
    }

    /// Mark `seqno` in the sliding receive bitmap.
    fn mark_received(&mut self, seqno: u16) {
        if self.bitmap == 0 {
            self.first = seqno;
            self.bitmap = 1;
            return;
        }
        let offset = seqno.wrapping_sub(self.first);
        if offset < 32 {
            self.bitmap |= 1 << offset;
        } else if offset < SEQNO_AHEAD {
            let shift = offset - 31;
            if shift >= 32 {
                self.first = seqno;
                self.bitmap = 1;
            } else {
                self.bitmap >>= shift;
                self.first = self.first.wrapping_add(shift);
                self.bitmap |= 1 << 31;
            }
        }
        // seqnos behind the window are not tracked
    }

    fn resize(&mut self, capacity: usize) {
        let old_len = self.entries.len();
        let mut kept: Vec<Entry> = Vec::with_capacity(capacity);
        // walk the ring from oldest to newest, keep the newest that fit
        for i in 0..old_len {
            let entry = &self.entries[(self.position + i) % old_len];
            if entry.len > 0 {
                kept.push(entry.clone());
            }
        }
        if kept.len() > capacity {
            kept.drain(..kept.len() - capacity);
        }
        let position = kept.len() % capacity;
        kept.resize(capacity, Entry::default());
        self.entries = kept;
        self.position = position;
    }
}

fn copy_entry(entry: &Entry, buf: &mut [u8]) -> usize {
    let len = (entry.len as usize).min(buf.len());
    buf[..len].copy_from_slice(&entry.data[..len]);
    len
}
