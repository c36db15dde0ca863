//! Selective-repeat send-side state machine.
//!
//! [`SendWindow`] tracks every DATA packet that has been transmitted but not
//! yet acknowledged.  Unlike Go-Back-N, each packet is acked individually and
//! only the packet whose own timer expires is retransmitted.
//!
//! # Protocol contract
//!
//! - Packets live in a slot vector indexed directly by sequence number
//!   (vector length = sequence-space modulus, twice the window).
//! - A resend list holds the unacked sequence numbers ordered by the time
//!   they were last handed to the wire, oldest at the front.  Retransmission
//!   rotates the head to the tail and resets its timer.
//! - An ACK clears the packet's slot and removes it from the resend list,
//!   wherever it sits; acks may arrive in any order.
//! - A duplicate ACK for an already-cleared slot is a no-op.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility (same split as [`crate::recv_window`]).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::packet::Packet;
use crate::seq::SeqSpace;

// ---------------------------------------------------------------------------
// SendSlot
// ---------------------------------------------------------------------------

/// One outstanding DATA packet awaiting its acknowledgement.
#[derive(Debug, Clone)]
struct SendSlot {
    /// The packet as it goes on the wire (retransmissions resend it verbatim).
    packet: Packet,
    /// When this packet was last handed to the wire.
    sent_at: Instant,
    /// Total number of transmissions, the first included.
    tx_count: u32,
}

// ---------------------------------------------------------------------------
// SendWindow
// ---------------------------------------------------------------------------

/// Send-side sliding-window state for one endpoint.
///
/// # Sequence-number layout
///
/// ```text
///   oldest unacked        next_seq
///        │                   │
///  ──────┼───────────────────┼──────────────▶ seq space (mod 2·wSize)
///        │ ◀── in flight ──▶ │ ◀─ admissible ─▶
/// ```
#[derive(Debug)]
pub struct SendWindow {
    space: SeqSpace,
    /// Outstanding packets, indexed by sequence number.  `None` = acked or
    /// never sent.
    slots: Vec<Option<SendSlot>>,
    /// Unacked sequence numbers, ordered by last transmission (front = oldest).
    resend_list: VecDeque<u16>,
    /// Sequence number the next admitted packet will carry.
    next_seq: u16,
    /// Total number of timer-driven retransmissions so far.
    retransmissions: u64,
}

impl SendWindow {
    /// Create an empty window for a `w_size`-packet protocol window.
    pub fn new(w_size: u16) -> Self {
        let space = SeqSpace::new(w_size);
        Self {
            space,
            slots: vec![None; space.modulus() as usize],
            resend_list: VecDeque::new(),
            next_seq: 0,
            retransmissions: 0,
        }
    }

    /// The sequence space this window numbers its packets in.
    pub fn space(&self) -> SeqSpace {
        self.space
    }

    /// Sequence number the next admitted packet will carry.
    pub fn next_seq(&self) -> u16 {
        self.next_seq
    }

    /// `true` when every transmitted packet has been acknowledged.
    pub fn is_empty(&self) -> bool {
        self.resend_list.is_empty()
    }

    /// Number of packets currently awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.resend_list.len()
    }

    /// Total number of timer-driven retransmissions so far.
    pub fn retransmissions(&self) -> u64 {
        self.retransmissions
    }

    /// `true` when the window has room for one more outstanding packet.
    ///
    /// With nothing outstanding admission is always permitted; otherwise the
    /// distance from the oldest unacked packet to `next_seq` must stay below
    /// `wSize − 1`, one slot shy of the nominal window.
    pub fn can_admit(&self) -> bool {
        match self.resend_list.front() {
            None => true,
            Some(&oldest) => self.space.diff(self.next_seq, oldest) < self.space.w_size() - 1,
        }
    }

    /// Admit one payload: build its DATA packet, occupy the slot, start the
    /// resend timer, and advance `next_seq`.
    ///
    /// Returns the packet for its first transmission.  Check [`can_admit`]
    /// first; admission into a full window is a logic error upstream.
    ///
    /// [`can_admit`]: SendWindow::can_admit
    pub fn admit(&mut self, payload: String, now: Instant) -> Packet {
        debug_assert!(self.can_admit(), "admit called on a full send window");
        let seq = self.next_seq;
        let packet = Packet::data(seq, payload);
        self.slots[seq as usize] = Some(SendSlot {
            packet: packet.clone(),
            sent_at: now,
            tx_count: 1,
        });
        self.resend_list.push_back(seq);
        self.next_seq = self.space.incr(seq);
        packet
    }

    /// Retire the slot acknowledged by `seq`.
    ///
    /// Returns `true` when the ack retired an outstanding packet, `false`
    /// for a duplicate (slot already empty) or a sequence number outside the
    /// space.
    pub fn on_ack(&mut self, seq: u16) -> bool {
        if !self.space.contains(seq) {
            return false;
        }
        if self.slots[seq as usize].take().is_none() {
            return false;
        }
        if let Some(pos) = self.resend_list.iter().position(|&s| s == seq) {
            self.resend_list.remove(pos);
        }
        true
    }

    /// Check the oldest unacked packet's timer against `timeout`.
    ///
    /// When expired, the timer is reset, the entry rotates from the head to
    /// the tail of the resend list, and the packet is returned for
    /// retransmission.  At most one packet is returned per call; younger
    /// entries wait for later calls.
    pub fn pop_due(&mut self, now: Instant, timeout: Duration) -> Option<Packet> {
        let &oldest = self.resend_list.front()?;
        let slot = self.slots[oldest as usize].as_mut()?;
        if now.duration_since(slot.sent_at) <= timeout {
            return None;
        }
        slot.sent_at = now;
        slot.tx_count += 1;
        let packet = slot.packet.clone();
        self.resend_list.rotate_left(1);
        self.retransmissions += 1;
        Some(packet)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn past(now: Instant) -> Instant {
        now - Duration::from_secs(1)
    }

    #[test]
    fn initial_state() {
        let w = SendWindow::new(4);
        assert!(w.is_empty());
        assert!(w.can_admit());
        assert_eq!(w.next_seq(), 0);
        assert_eq!(w.in_flight(), 0);
    }

    #[test]
    fn admit_builds_data_packet_and_advances() {
        let mut w = SendWindow::new(4);
        let p = w.admit("hello".into(), Instant::now());
        assert_eq!(p.kind, PacketType::Data);
        assert_eq!(p.seq, 0);
        assert_eq!(p.payload, "hello");
        assert_eq!(w.next_seq(), 1);
        assert_eq!(w.in_flight(), 1);
    }

    #[test]
    fn admission_blocks_one_shy_of_the_window() {
        let mut w = SendWindow::new(4);
        let now = Instant::now();
        for _ in 0..3 {
            assert!(w.can_admit());
            w.admit("x".into(), now);
        }
        // three outstanding of a four-packet window: admission stops here
        assert!(!w.can_admit());
        assert_eq!(w.in_flight(), 3);
    }

    #[test]
    fn ack_reopens_the_window() {
        let mut w = SendWindow::new(4);
        let now = Instant::now();
        for _ in 0..3 {
            w.admit("x".into(), now);
        }
        assert!(!w.can_admit());
        assert!(w.on_ack(0));
        assert!(w.can_admit());
        assert_eq!(w.in_flight(), 2);
    }

    #[test]
    fn acks_in_any_order_retire_slots() {
        let mut w = SendWindow::new(4);
        let now = Instant::now();
        for _ in 0..3 {
            w.admit("x".into(), now);
        }
        assert!(w.on_ack(1));
        assert!(w.on_ack(2));
        assert!(w.on_ack(0));
        assert!(w.is_empty());
    }

    #[test]
    fn duplicate_ack_is_a_no_op() {
        let mut w = SendWindow::new(4);
        w.admit("x".into(), Instant::now());
        assert!(w.on_ack(0));
        assert!(!w.on_ack(0));
        assert!(w.is_empty());
    }

    #[test]
    fn ack_outside_the_space_is_ignored() {
        let mut w = SendWindow::new(4); // modulus 8
        w.admit("x".into(), Instant::now());
        assert!(!w.on_ack(8));
        assert!(!w.on_ack(u16::MAX));
        assert_eq!(w.in_flight(), 1);
    }

    #[test]
    fn nothing_due_before_timeout() {
        let mut w = SendWindow::new(4);
        let now = Instant::now();
        w.admit("x".into(), now);
        assert!(w.pop_due(now, TIMEOUT).is_none());
        assert_eq!(w.retransmissions(), 0);
    }

    #[test]
    fn expired_head_is_retransmitted_and_rotated() {
        let mut w = SendWindow::new(4);
        let now = Instant::now();
        w.admit("first".into(), past(now));
        w.admit("second".into(), past(now));

        let p = w.pop_due(now, TIMEOUT).expect("head timer expired");
        assert_eq!(p.seq, 0);
        assert_eq!(w.retransmissions(), 1);
        let slot = w.slots[0].as_ref().unwrap();
        assert_eq!(slot.tx_count, 2);
        assert_eq!(slot.sent_at, now);

        // seq 0 moved to the tail with a fresh timer; seq 1 is the head now
        let p = w.pop_due(now, TIMEOUT).expect("next-oldest timer expired");
        assert_eq!(p.seq, 1);

        // both timers reset: nothing further is due at the same instant
        assert!(w.pop_due(now, TIMEOUT).is_none());
        assert_eq!(w.in_flight(), 2);
    }

    #[test]
    fn only_one_retransmission_per_call() {
        let mut w = SendWindow::new(4);
        let now = Instant::now();
        w.admit("a".into(), past(now));
        w.admit("b".into(), past(now));
        w.admit("c".into(), past(now));

        let seqs: Vec<u16> = std::iter::from_fn(|| w.pop_due(now, TIMEOUT))
            .map(|p| p.seq)
            .collect();
        // oldest first, one per call, then everything is freshly timed
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn sequence_numbers_wrap_around() {
        let mut w = SendWindow::new(3); // modulus 6
        let now = Instant::now();
        for i in 0..8u16 {
            let p = w.admit(format!("p{i}"), now);
            assert_eq!(p.seq, i % 6);
            assert!(w.on_ack(p.seq));
        }
        assert_eq!(w.next_seq(), 2);
        assert!(w.is_empty());
    }

    #[test]
    fn resend_list_tracks_occupied_slots() {
        // invariant: list length always equals the number of occupied slots
        let mut w = SendWindow::new(4);
        let now = Instant::now();
        for _ in 0..3 {
            w.admit("x".into(), now);
        }
        w.on_ack(1);
        w.on_ack(1); // duplicate
        let occupied = w.slots.iter().filter(|s| s.is_some()).count();
        assert_eq!(occupied, 2); // seqs 0 and 2
        assert_eq!(w.in_flight(), occupied);
    }
}
