use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use super::protocol::Packet;

#[derive(Debug, Clone)]
pub struct ReliablePacket {
    pub sequence: u32,
    /// The complete inner frame, re-wrapped on every transmission.
    pub frame: Vec<u8>,
    pub sent_at: Instant,
    pub retries: u32,
    pub acked: bool,
}

impl ReliablePacket {
    pub fn wire_bytes(&self) -> Vec<u8> {
        Packet::Reliable {
            sequence: self.sequence,
            frame: self.frame.clone(),
        }
        .encode()
    }
}

/// Smoothed round-trip estimate (RFC 6298 constants).
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt: f32,
    rtt_var: f32,
    samples: u64,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self {
            srtt: 100.0,
            rtt_var: 50.0,
            samples: 0,
        }
    }
}

impl RttEstimator {
    pub fn observe(&mut self, sample: Duration) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let rtt = sample.as_secs_f32() * 1000.0;
        if self.samples == 0 {
            self.srtt = rtt;
            self.rtt_var = rtt / 2.0;
        } else {
            let diff = (rtt - self.srtt).abs();
            self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
            self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt;
        }
        self.samples += 1;
    }

    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// The packet was pending and is now released. `rtt` is only measured
    /// for packets that were never retransmitted.
    Released { rtt: Option<Duration> },
    /// Already acknowledged or given up on.
    Unknown,
}

#[derive(Debug, Default)]
pub struct ReliableUpdate {
    pub retransmit: Vec<Vec<u8>>,
    pub lost: Vec<u32>,
}

/// Outbound half of reliable delivery: owns every unacknowledged packet.
#[derive(Debug)]
pub struct ReliableSender {
    pending: VecDeque<ReliablePacket>,
    next_sequence: u32,
    retry_interval: Duration,
    max_retries: u32,
    rtt: RttEstimator,
    lost_total: u64,
    retransmit_total: u64,
}

impl ReliableSender {
    pub fn new(retry_interval: Duration, max_retries: u32) -> Self {
        Self {
            pending: VecDeque::new(),
            next_sequence: 1,
            retry_interval,
            max_retries,
            rtt: RttEstimator::default(),
            lost_total: 0,
            retransmit_total: 0,
        }
    }

    /// Stores `frame` under the next sequence and returns the bytes to put on
    /// the wire now.
    pub fn send(&mut self, frame: Vec<u8>, now: Instant) -> (u32, Vec<u8>) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let packet = ReliablePacket {
            sequence,
            frame,
            sent_at: now,
            retries: 0,
            acked: false,
        };
        let bytes = packet.wire_bytes();
        self.pending.push_back(packet);

        (sequence, bytes)
    }

    pub fn acknowledge(&mut self, sequence: u32, now: Instant) -> Acknowledgement {
        let Some(packet) = self
            .pending
            .iter_mut()
            .find(|p| p.sequence == sequence && !p.acked)
        else {
            return Acknowledgement::Unknown;
        };

        packet.acked = true;
        let rtt = (packet.retries == 0).then(|| now.duration_since(packet.sent_at));
        if let Some(sample) = rtt {
            self.rtt.observe(sample);
        }

        self.pending.retain(|p| !p.acked);
        Acknowledgement::Released { rtt }
    }

    /// Retransmits overdue packets and expires the ones out of retries.
    pub fn update(&mut self, now: Instant) -> ReliableUpdate {
        let mut update = ReliableUpdate::default();

        for packet in &mut self.pending {
            if now.duration_since(packet.sent_at) <= self.retry_interval {
                continue;
            }

            if packet.retries < self.max_retries {
                packet.retries += 1;
                packet.sent_at = now;
                update.retransmit.push(packet.wire_bytes());
            } else {
                packet.acked = true;
                update.lost.push(packet.sequence);
            }
        }

        if !update.lost.is_empty() {
            self.pending.retain(|p| !p.acked);
        }

        self.lost_total += update.lost.len() as u64;
        self.retransmit_total += update.retransmit.len() as u64;
        update
    }

    pub fn observe_rtt(&mut self, sample: Duration) {
        self.rtt.observe(sample);
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drops a packet that never reached the wire.
    pub fn cancel(&mut self, sequence: u32) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.sequence != sequence);
        self.pending.len() != before
    }

    pub fn is_pending(&self, sequence: u32) -> bool {
        self.pending.iter().any(|p| p.sequence == sequence)
    }

    pub fn lost_total(&self) -> u64 {
        self.lost_total
    }

    pub fn retransmit_total(&self) -> u64 {
        self.retransmit_total
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Inbound half: remembers recently processed sequences so duplicates are
/// acknowledged again but never reapplied.
#[derive(Debug)]
pub struct ReceiveTracker {
    seen: HashSet<u32>,
    order: VecDeque<u32>,
    window: usize,
}

impl Default for ReceiveTracker {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ReceiveTracker {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            seen: HashSet::with_capacity(window),
            order: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Returns `false` if `sequence` was already processed.
    pub fn record_received(&mut self, sequence: u32) -> bool {
        if !self.seen.insert(sequence) {
            return false;
        }

        if self.order.len() >= self.window {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(sequence);

        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
