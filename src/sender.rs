//! Outbound half of the substrate: the Sender task.
//!
//! The Sender drains the engine's outbound packet queue and writes each
//! packet to the UDP socket, after optionally discarding it to simulate a
//! lossy network.  Discarded packets never touch the socket; the engine's
//! retransmission timers recover them.
//!
//! The task idles until the peer address is known (either configured up
//! front or learned by the Receiver from the first inbound packet) and
//! self-terminates once it has handled nothing for three seconds after its
//! first packet.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::mpsc;
use tokio::sync::OnceCell;
use tokio::time::timeout;

use crate::packet::{Packet, PacketType};
use crate::socket::Socket;
use crate::substrate::SubstrateError;

/// The task exits after handling nothing for this long (measured from the
/// first handled packet).
const IDLE_LIMIT: Duration = Duration::from_secs(3);

/// Bounded wait on the outbound queue between termination checks.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Traffic counters reported by the Sender task when it exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// DATA packets written to the socket.
    pub data_sent: u64,
    /// ACK packets written to the socket.
    pub acks_sent: u64,
    /// DATA packets discarded by loss injection.
    pub data_discarded: u64,
    /// ACK packets discarded by loss injection.
    pub acks_discarded: u64,
    /// Time between the first and last handled packet.
    pub run_length: Duration,
}

// ---------------------------------------------------------------------------
// Sender task
// ---------------------------------------------------------------------------

pub(crate) struct Sender {
    socket: Arc<Socket>,
    peer: Arc<OnceCell<SocketAddr>>,
    out_rx: mpsc::Receiver<Packet>,
    disc_prob: f64,
}

impl Sender {
    pub(crate) fn new(
        socket: Arc<Socket>,
        peer: Arc<OnceCell<SocketAddr>>,
        out_rx: mpsc::Receiver<Packet>,
        disc_prob: f64,
    ) -> Self {
        Self {
            socket,
            peer,
            out_rx,
            disc_prob,
        }
    }

    /// Drain the outbound queue until the idle timer expires.
    pub(crate) async fn run(mut self) -> Result<SenderStats, SubstrateError> {
        let mut stats = SenderStats::default();
        let mut first_event: Option<Instant> = None;
        let mut last_event: Option<Instant> = None;

        loop {
            if let Some(last) = last_event {
                if last.elapsed() > IDLE_LIMIT {
                    break;
                }
            }

            // Idle until the Receiver has learned who we talk to.
            let Some(&peer) = self.peer.get() else {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            };

            let packet = match timeout(POLL_INTERVAL, self.out_rx.recv()).await {
                Err(_) => continue, // queue idle; recheck termination
                Ok(None) => break,  // engine dropped its handle
                Ok(Some(p)) => p,
            };

            let now = Instant::now();
            first_event.get_or_insert(now);
            last_event = Some(now);

            if rand::rng().random::<f64>() < self.disc_prob {
                match packet.kind {
                    PacketType::Data => stats.data_discarded += 1,
                    PacketType::Ack => stats.acks_discarded += 1,
                }
                log::debug!("discarding {packet}");
                continue;
            }

            match packet.kind {
                PacketType::Data => stats.data_sent += 1,
                PacketType::Ack => stats.acks_sent += 1,
            }
            log::debug!("{} sending to {peer} {packet}", self.socket.local_addr);
            self.socket.send_to(&packet, peer).await?;
        }

        if let (Some(first), Some(last)) = (first_event, last_event) {
            stats.run_length = last.duration_since(first);
        }
        log::info!(
            "sender: sent {} data packets, {} acks; discarded {} data packets, {} acks; run length {:.3}s",
            stats.data_sent,
            stats.acks_sent,
            stats.data_discarded,
            stats.acks_discarded,
            stats.run_length.as_secs_f64(),
        );
        Ok(stats)
    }
}
