//! Reliable-ordered sequencing. Sequences skip 0, so an ack of 0 means
//! nothing was delivered yet; bit `i` of `ack_bits` covers `ack + 2 + i`.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

pub const MIN_RESEND_INTERVAL: Duration = Duration::from_millis(50);
pub const MAX_RESEND_INTERVAL: Duration = Duration::from_millis(1000);
/// How far ahead of the next expected sequence the receiver will buffer.
pub const RECEIVE_WINDOW: u32 = 1024;

pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

pub fn next_sequence(sequence: u32) -> u32 {
    match sequence.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

fn previous_sequence(sequence: u32) -> u32 {
    match sequence.wrapping_sub(1) {
        0 => u32::MAX,
        prev => prev,
    }
}

#[derive(Debug, Clone)]
pub struct PendingPacket {
    pub sequence: u32,
    pub payload: Vec<u8>,
    pub send_time: Instant,
    pub last_sent: Instant,
    pub resends: u32,
}

/// Sender half: keeps every reliable payload until the peer acknowledges it.
#[derive(Debug)]
pub struct AckTracker {
    pending: VecDeque<PendingPacket>,
    max_pending: usize,
    next_sequence: u32,
    srtt: f32,
    rtt_var: f32,
}

impl AckTracker {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            max_pending,
            next_sequence: 1,
            srtt: 100.0,
            rtt_var: 50.0,
        }
    }

    /// Returns `None` when the resend queue is full.
    pub fn track_packet(&mut self, payload: &[u8], now: Instant) -> Option<u32> {
        if self.pending.len() >= self.max_pending {
            return None;
        }

        let sequence = self.next_sequence;
        self.next_sequence = next_sequence(sequence);
        self.pending.push_back(PendingPacket {
            sequence,
            payload: payload.to_vec(),
            send_time: now,
            last_sent: now,
            resends: 0,
        });
        Some(sequence)
    }

    /// Returns how many packets the ack released.
    pub fn process_ack(&mut self, ack: u32, ack_bits: u32, now: Instant) -> usize {
        let mut rtt_samples = Vec::new();

        let before = self.pending.len();
        self.pending.retain(|pending| {
            let delivered = ack != 0
                && (pending.sequence == ack || sequence_greater_than(ack, pending.sequence));
            let buffered = {
                let diff = pending.sequence.wrapping_sub(ack);
                (2..=33).contains(&diff) && ack_bits & (1 << (diff - 2)) != 0
            };

            if delivered || buffered {
                // Only first transmissions give an unambiguous sample.
                if pending.resends == 0 {
                    rtt_samples.push(now.duration_since(pending.send_time).as_secs_f32() * 1000.0);
                }
                false
            } else {
                true
            }
        });

        for rtt in rtt_samples {
            self.update_rtt(rtt);
        }

        before - self.pending.len()
    }

    fn update_rtt(&mut self, rtt: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let diff = (rtt - self.srtt).abs();
        self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
        self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt;
    }

    pub fn resend_interval(&self) -> Duration {
        let ms = (self.srtt + 4.0 * self.rtt_var).max(0.0);
        Duration::from_secs_f32(ms / 1000.0).clamp(MIN_RESEND_INTERVAL, MAX_RESEND_INTERVAL)
    }

    pub fn due_resends(&mut self, now: Instant) -> Vec<(u32, Vec<u8>)> {
        let interval = self.resend_interval();
        let mut due = Vec::new();

        for pending in &mut self.pending {
            if now.duration_since(pending.last_sent) >= interval {
                pending.last_sent = now;
                pending.resends += 1;
                due.push((pending.sequence, pending.payload.clone()));
            }
        }

        due
    }

    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    pub fn unacked_count(&self) -> usize {
        self.pending.len()
    }
}

/// Receiver half.
#[derive(Debug)]
pub struct ReceiveTracker {
    next_expected: u32,
    delivered_any: bool,
    buffered: BTreeMap<u32, Vec<u8>>,
}

impl Default for ReceiveTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveTracker {
    pub fn new() -> Self {
        Self {
            next_expected: 1,
            delivered_any: false,
            buffered: BTreeMap::new(),
        }
    }

    pub fn record_received(&mut self, sequence: u32, payload: Vec<u8>) -> Vec<Vec<u8>> {
        if sequence == 0 {
            return Vec::new();
        }

        let ahead = sequence.wrapping_sub(self.next_expected);
        if sequence_greater_than(self.next_expected, sequence) || ahead >= RECEIVE_WINDOW {
            return Vec::new();
        }

        self.buffered.entry(sequence).or_insert(payload);

        let mut ready = Vec::new();
        while let Some(payload) = self.buffered.remove(&self.next_expected) {
            ready.push(payload);
            self.delivered_any = true;
            self.next_expected = next_sequence(self.next_expected);
        }
        ready
    }

    pub fn ack_data(&self) -> (u32, u32) {
        let ack = if self.delivered_any {
            previous_sequence(self.next_expected)
        } else {
            0
        };

        let mut bits = 0u32;
        for i in 0..32u32 {
            if self.buffered.contains_key(&ack.wrapping_add(2 + i)) {
                bits |= 1 << i;
            }
        }
        (ack, bits)
    }

    pub fn buffered_count(&self) -> usize {
        self.buffered.len()
    }
}
