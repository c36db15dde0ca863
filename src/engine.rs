//! The reliable-transport engine: sliding window with selective repeat.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │ send() / receive()
//!      ▼
//!  ┌─────────────────────────┐
//!  │   Rdt (handle)          │  bounded payload queues, both directions
//!  └───────────┬─────────────┘
//!              │ engine task
//!  ┌───────────▼─────────────┐
//!  │  Engine                 │
//!  │   ├── SendWindow        │  outstanding DATA + resend timers
//!  │   └── ReceiveWindow     │  out-of-order resequencing buffer
//!  └───────────┬─────────────┘
//!              │ SubstrateHandle (packet queues)
//!              ▼
//!        Sender / Receiver tasks ── UDP ── peer
//! ```
//!
//! # The event loop
//!
//! The engine is one task owning all window state.  Every iteration runs at
//! most the first action whose guard holds, in strict priority order:
//!
//! 1. deliver contiguous buffered payloads to the application,
//! 2. process one inbound packet (DATA → ack always, buffer if in-window;
//!    ACK → retire the send slot),
//! 3. retransmit the single oldest packet whose timer expired,
//! 4. admit one new DATA packet from the application.
//!
//! Receive-side liveness and ack feedback come before new transmissions:
//! delivering frees application capacity, acks free window slots, and an
//! overdue packet is never starved by fresh sends.  When no guard holds the
//! loop sleeps one millisecond.
//!
//! A stop request is cooperative: the loop keeps running until the send
//! window has fully drained, so every accepted payload is acknowledged
//! before the engine exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::packet::{Packet, PacketType, MAX_PAYLOAD};
use crate::recv_window::ReceiveWindow;
use crate::send_window::SendWindow;
use crate::seq::MAX_WINDOW;
use crate::substrate::SubstrateHandle;

/// Capacity of the application-facing payload queues.
const APP_QUEUE_CAPACITY: usize = 1000;

/// Sleep between loop iterations when no action fires.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Protocol parameters for one endpoint.
#[derive(Debug, Clone)]
pub struct RdtConfig {
    /// Window size in packets; the sequence space is twice this.  Clamped
    /// to [`MAX_WINDOW`].  Both peers should use the same value.
    pub w_size: u16,
    /// Time to wait for an ack before retransmitting a packet.
    pub timeout: Duration,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced through the application API.
#[derive(Debug, Error)]
pub enum RdtError {
    /// The payload can never be carried in one packet; nothing was queued.
    #[error("payload of {0} bytes exceeds the 1397-byte limit")]
    PayloadTooLarge(usize),
    /// The payload is not US-ASCII; nothing was queued.
    #[error("payload is not US-ASCII")]
    NotAscii,
    /// The engine has stopped.
    #[error("transport engine is not running")]
    Stopped,
}

// ---------------------------------------------------------------------------
// Rdt — application handle
// ---------------------------------------------------------------------------

/// Handle to a running reliable-transport endpoint.
///
/// Created by [`Rdt::start`], which spawns the engine task over a
/// [`SubstrateHandle`].  Payloads given to [`send`] come out of the peer's
/// [`receive`] exactly once, in order, regardless of loss and reordering
/// underneath.
///
/// [`send`]: Rdt::send
/// [`receive`]: Rdt::receive
pub struct Rdt {
    from_src_tx: mpsc::Sender<String>,
    to_snk_rx: mpsc::Receiver<String>,
    quit: Arc<AtomicBool>,
    engine: JoinHandle<()>,
}

impl Rdt {
    /// Spawn the protocol engine over `sub` and return the handle.
    pub fn start(config: RdtConfig, sub: SubstrateHandle) -> Self {
        let w_size = config.w_size.min(MAX_WINDOW);
        let quit = Arc::new(AtomicBool::new(false));
        let (from_src_tx, from_src_rx) = mpsc::channel(APP_QUEUE_CAPACITY);
        let (to_snk_tx, to_snk_rx) = mpsc::channel(APP_QUEUE_CAPACITY);

        let engine = Engine {
            sub,
            send_window: SendWindow::new(w_size),
            recv_window: ReceiveWindow::new(w_size),
            timeout: config.timeout,
            from_src: from_src_rx,
            to_snk: to_snk_tx,
            quit: quit.clone(),
        };
        let engine = tokio::spawn(engine.run());

        Self {
            from_src_tx,
            to_snk_rx,
            quit,
            engine,
        }
    }

    /// Queue a payload for reliable delivery to the peer.
    ///
    /// Waits while the outbound application queue is full.  Payloads the
    /// codec could never carry are refused here, before anything is queued.
    pub async fn send(&self, payload: String) -> Result<(), RdtError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(RdtError::PayloadTooLarge(payload.len()));
        }
        if !payload.is_ascii() {
            return Err(RdtError::NotAscii);
        }
        self.from_src_tx
            .send(payload)
            .await
            .map_err(|_| RdtError::Stopped)
    }

    /// `true` when [`send`](Rdt::send) would not have to wait.
    pub fn ready(&self) -> bool {
        self.from_src_tx.capacity() > 0
    }

    /// Wait for the next in-order payload from the peer.
    ///
    /// Returns `None` once the engine has stopped and every delivered
    /// payload has been consumed.
    pub async fn receive(&mut self) -> Option<String> {
        self.to_snk_rx.recv().await
    }

    /// `true` when a payload is waiting and [`receive`](Rdt::receive) would
    /// return immediately.
    pub fn incoming(&self) -> bool {
        !self.to_snk_rx.is_empty()
    }

    /// Request shutdown and wait for the engine to drain.
    ///
    /// The engine keeps retransmitting until every outstanding packet is
    /// acknowledged, so a clean stop guarantees the peer got everything.
    pub async fn stop(self) {
        self.quit.store(true, Ordering::Relaxed);
        let _ = self.engine.await;
    }
}

// ---------------------------------------------------------------------------
// Engine — the event loop
// ---------------------------------------------------------------------------

struct Engine {
    sub: SubstrateHandle,
    send_window: SendWindow,
    recv_window: ReceiveWindow,
    timeout: Duration,
    from_src: mpsc::Receiver<String>,
    to_snk: mpsc::Sender<String>,
    quit: Arc<AtomicBool>,
}

impl Engine {
    async fn run(mut self) {
        while !self.quit.load(Ordering::Relaxed) || !self.send_window.is_empty() {
            if !self.step(Instant::now()).await {
                tokio::time::sleep(IDLE_SLEEP).await;
            }
        }
        log::debug!(
            "engine stopped; {} retransmissions total",
            self.send_window.retransmissions()
        );
    }

    /// Run the highest-priority action whose guard holds.
    ///
    /// Returns `false` when every guard was idle and the loop should sleep.
    async fn step(&mut self, now: Instant) -> bool {
        if self.upload_ordered() {
            return true;
        }
        if self.process_incoming().await {
            return true;
        }
        if self.resend_timed_out(now).await {
            return true;
        }
        self.admit_ready(now).await
    }

    /// Action 1: move contiguous buffered payloads up to the application.
    ///
    /// Walks forward from the next expected sequence number, stopping at the
    /// first gap or when the sink queue is full; deferred payloads stay in
    /// the receive window for a later pass.
    fn upload_ordered(&mut self) -> bool {
        let mut delivered = false;
        while self.recv_window.ready() {
            match self.to_snk.try_reserve() {
                Ok(permit) => {
                    if let Some(payload) = self.recv_window.advance() {
                        permit.send(payload);
                        delivered = true;
                    }
                }
                Err(_) => {
                    log::debug!("application sink full; deferring delivery");
                    break;
                }
            }
        }
        delivered
    }

    /// Action 2: consume one packet from the substrate.
    async fn process_incoming(&mut self) -> bool {
        if !self.sub.incoming() {
            return false;
        }
        // Non-empty and this task is the only consumer, so this never waits.
        let Some(packet) = self.sub.receive().await else {
            return false;
        };
        match packet.kind {
            PacketType::Data => {
                // Ack unconditionally: the previous ack for this sequence
                // number may have been lost.
                self.sub.send(Packet::ack(packet.seq)).await;
                if !self.recv_window.on_data(packet.seq, packet.payload) {
                    log::debug!("data[{}] outside receive window; acked only", packet.seq);
                }
            }
            PacketType::Ack => {
                if !self.send_window.on_ack(packet.seq) {
                    log::debug!("stale ack[{}] ignored", packet.seq);
                }
            }
        }
        true
    }

    /// Action 3: retransmit the oldest packet whose timer expired, if any.
    async fn resend_timed_out(&mut self, now: Instant) -> bool {
        match self.send_window.pop_due(now, self.timeout) {
            Some(packet) => {
                log::debug!("retransmitting {packet}");
                self.sub.send(packet).await;
                true
            }
            None => false,
        }
    }

    /// Action 4: admit one payload from the application as a new DATA packet.
    async fn admit_ready(&mut self, now: Instant) -> bool {
        if !self.sub.ready() || !self.send_window.can_admit() {
            return false;
        }
        let Ok(payload) = self.from_src.try_recv() else {
            return false;
        };
        let packet = self.send_window.admit(payload, now);
        log::debug!("sending {packet}");
        self.sub.send(packet).await;
        true
    }
}
