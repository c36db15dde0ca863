//! Inbound half of the substrate: the Receiver task.
//!
//! The Receiver owns the receive side of the UDP socket.  It reads one
//! datagram at a time (with a short poll timeout so termination is checked
//! regularly), decodes it, and queues it for the engine.  A full inbound
//! queue drops the packet — bounded loss that the peer's retransmission
//! timer recovers.
//!
//! The first packet teaches this endpoint its peer: the sender's address is
//! stored in the shared one-shot slot that the Sender task is waiting on.
//! Any later packet from a different address is a fatal protocol error, as
//! is a datagram that does not decode.
//!
//! The task self-terminates once nothing has been received for five seconds
//! after the first packet.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::OnceCell;
use tokio::time::timeout;

use crate::packet::{Packet, PacketType};
use crate::socket::Socket;
use crate::substrate::SubstrateError;

/// The task exits after receiving nothing for this long (measured from the
/// first received packet).
const IDLE_LIMIT: Duration = Duration::from_secs(5);

/// Bounded wait on the socket between termination checks.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Traffic counters reported by the Receiver task when it exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// DATA packets received and queued or dropped.
    pub data_received: u64,
    /// ACK packets received and queued or dropped.
    pub acks_received: u64,
    /// Packets dropped because the inbound queue was full.
    pub discarded: u64,
    /// Time between the first and last received packet.
    pub run_length: Duration,
}

// ---------------------------------------------------------------------------
// Receiver task
// ---------------------------------------------------------------------------

pub(crate) struct Receiver {
    socket: Arc<Socket>,
    peer: Arc<OnceCell<SocketAddr>>,
    in_tx: mpsc::Sender<Packet>,
}

impl Receiver {
    pub(crate) fn new(
        socket: Arc<Socket>,
        peer: Arc<OnceCell<SocketAddr>>,
        in_tx: mpsc::Sender<Packet>,
    ) -> Self {
        Self {
            socket,
            peer,
            in_tx,
        }
    }

    /// Read datagrams into the inbound queue until the idle timer expires.
    pub(crate) async fn run(self) -> Result<ReceiverStats, SubstrateError> {
        let mut stats = ReceiverStats::default();
        let mut first_event: Option<Instant> = None;
        let mut last_event: Option<Instant> = None;

        loop {
            if let Some(last) = last_event {
                if last.elapsed() > IDLE_LIMIT {
                    break;
                }
            }

            let (packet, addr) = match timeout(POLL_INTERVAL, self.socket.recv_from()).await {
                Err(_) => continue,                 // socket idle; recheck termination
                Ok(Err(e)) => return Err(e.into()), // I/O failure or malformed packet
                Ok(Ok(received)) => received,
            };

            let now = Instant::now();
            first_event.get_or_insert(now);
            last_event = Some(now);

            match self.peer.get() {
                // First packet: adopt its sender as our peer.
                None => {
                    log::info!("learned peer address {addr}");
                    self.peer.set(addr).ok();
                }
                Some(&known) if known != addr => {
                    return Err(SubstrateError::UnexpectedPeer {
                        expected: known,
                        actual: addr,
                    });
                }
                Some(_) => {}
            }

            log::debug!("{} received from {addr} {packet}", self.socket.local_addr);
            match packet.kind {
                PacketType::Data => stats.data_received += 1,
                PacketType::Ack => stats.acks_received += 1,
            }
            if self.in_tx.try_send(packet).is_err() {
                stats.discarded += 1; // inbound queue full; retransmission recovers
            }
        }

        if let (Some(first), Some(last)) = (first_event, last_event) {
            stats.run_length = last.duration_since(first);
        }
        log::info!(
            "receiver: received {} data packets, {} acks; discarded {} arrivals; run length {:.3}s",
            stats.data_received,
            stats.acks_received,
            stats.discarded,
            stats.run_length.as_secs_f64(),
        );
        Ok(stats)
    }
}
