//! Selective-repeat receive-side state machine.
//!
//! [`ReceiveWindow`] buffers in-window DATA payloads as they arrive, in any
//! order, and releases them to the application strictly in sequence.  This is
//! the resequencing half of selective repeat: out-of-order packets wait in
//! their slot until the gap before them is filled.
//!
//! # Protocol contract
//!
//! - Slots are indexed by `seq mod wSize`; within the live window that index
//!   is unique, so a slot can be overwritten by a retransmitted duplicate
//!   without ambiguity.
//! - A packet is in-window iff its clockwise distance from `next_expected`
//!   is below `wSize`.  Anything further is a duplicate of an
//!   already-delivered packet: the caller still acks it but must not buffer.
//! - Delivery only ever advances `next_expected` one step at a time, through
//!   [`advance`], so the caller can stop mid-walk when the application sink
//!   is full without losing a payload.
//!
//! This module only manages state; acking and queue I/O belong to the caller
//! (same split as [`crate::send_window`]).
//!
//! [`advance`]: ReceiveWindow::advance

use crate::seq::SeqSpace;

// ---------------------------------------------------------------------------
// ReceiveWindow
// ---------------------------------------------------------------------------

/// Receive-side resequencing buffer for one endpoint.
#[derive(Debug)]
pub struct ReceiveWindow {
    space: SeqSpace,
    /// Payloads awaiting in-order delivery, indexed by `seq mod wSize`.
    slots: Vec<Option<String>>,
    /// Sequence number of the next payload owed to the application,
    /// in `[0, 2·wSize)`.
    next_expected: u16,
}

impl ReceiveWindow {
    /// Create an empty window expecting sequence number 0 first.
    pub fn new(w_size: u16) -> Self {
        let space = SeqSpace::new(w_size);
        Self {
            space,
            slots: vec![None; space.w_size() as usize],
            next_expected: 0,
        }
    }

    /// Sequence number of the next payload owed to the application.
    pub fn next_expected(&self) -> u16 {
        self.next_expected
    }

    /// Buffer an arriving DATA payload.
    ///
    /// Returns `true` when the packet was in-window and stored (overwriting
    /// any retransmitted duplicate already in the slot), `false` when it
    /// falls outside the window — a duplicate of a delivered packet that the
    /// caller acks but must not buffer.
    pub fn on_data(&mut self, seq: u16, payload: String) -> bool {
        if !self.space.contains(seq) {
            return false;
        }
        if self.space.diff(seq, self.next_expected) >= self.space.w_size() {
            return false;
        }
        self.slots[(seq % self.space.w_size()) as usize] = Some(payload);
        true
    }

    /// `true` when the payload owed next is buffered and deliverable.
    pub fn ready(&self) -> bool {
        self.slots[(self.next_expected % self.space.w_size()) as usize].is_some()
    }

    /// Take the deliverable payload and advance `next_expected`.
    ///
    /// Returns `None` when the next payload has not arrived yet.
    pub fn advance(&mut self) -> Option<String> {
        let idx = (self.next_expected % self.space.w_size()) as usize;
        let payload = self.slots[idx].take()?;
        self.next_expected = self.space.incr(self.next_expected);
        Some(payload)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
