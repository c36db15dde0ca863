//! The substrate: a lossy packet channel over one UDP socket.
//!
//! [`Substrate::bind`] opens the socket and spawns the two I/O tasks — the
//! [`crate::sender`] task owning the send side and the [`crate::receiver`]
//! task owning the receive side.  The protocol engine never touches the
//! socket; its whole view of the network is the [`SubstrateHandle`] returned
//! alongside: a pair of bounded packet queues with `ready` / `send` /
//! `incoming` / `receive` semantics.
//!
//! ```text
//!  engine ──send()───▶ out queue ──▶ Sender task ──▶ UDP ──▶ peer
//!  engine ◀─receive()── in queue ◀── Receiver task ◀── UDP ◀── peer
//! ```
//!
//! Both tasks self-terminate on their idle timers; [`Substrate::join`] waits
//! for that and surfaces their traffic statistics, or the first fatal error
//! (malformed packet, unexpected peer).

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::packet::Packet;
use crate::receiver::{Receiver, ReceiverStats};
use crate::sender::{Sender, SenderStats};
use crate::socket::{Socket, SocketError};

/// Capacity of the inbound and outbound packet queues.
pub const QUEUE_CAPACITY: usize = 1000;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Fatal conditions detected by the substrate tasks.
#[derive(Debug, Error)]
pub enum SubstrateError {
    /// Socket I/O failed or a datagram did not decode.
    #[error(transparent)]
    Socket(#[from] SocketError),
    /// A packet arrived from an address other than the established peer.
    #[error("received packet from unexpected sender {actual}, expected {expected}")]
    UnexpectedPeer {
        expected: SocketAddr,
        actual: SocketAddr,
    },
    /// A substrate task panicked or was aborted.
    #[error("substrate task failed")]
    TaskFailed,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Parameters for one endpoint's substrate.
#[derive(Debug, Clone)]
pub struct SubstrateConfig {
    /// Local address to bind; port 0 selects an ephemeral port.
    pub bind_addr: SocketAddr,
    /// Peer address, when known up front (client side).  When `None`, the
    /// Receiver adopts the sender of the first inbound packet.
    pub peer: Option<SocketAddr>,
    /// Probability in `[0, 1]` that an outgoing packet is discarded before
    /// the socket, exercising the retransmission paths.
    pub disc_prob: f64,
}

// ---------------------------------------------------------------------------
// Substrate
// ---------------------------------------------------------------------------

/// The running pair of I/O tasks behind one UDP socket.
pub struct Substrate {
    local_addr: SocketAddr,
    sender: JoinHandle<Result<SenderStats, SubstrateError>>,
    receiver: JoinHandle<Result<ReceiverStats, SubstrateError>>,
}

impl Substrate {
    /// Bind the socket and spawn the Sender and Receiver tasks.
    ///
    /// Returns the substrate plus the packet-queue handle the engine drives.
    pub async fn bind(config: SubstrateConfig) -> Result<(Self, SubstrateHandle), SubstrateError> {
        let socket = Arc::new(Socket::bind(config.bind_addr).await?);
        let local_addr = socket.local_addr;

        let peer = Arc::new(OnceCell::new());
        if let Some(addr) = config.peer {
            peer.set(addr).ok();
        }

        let (out_tx, out_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(QUEUE_CAPACITY);

        let sender = tokio::spawn(
            Sender::new(socket.clone(), peer.clone(), out_rx, config.disc_prob).run(),
        );
        let receiver = tokio::spawn(Receiver::new(socket, peer, in_tx).run());

        Ok((
            Self {
                local_addr,
                sender,
                receiver,
            },
            SubstrateHandle { out_tx, in_rx },
        ))
    }

    /// The bound local address (with the OS-assigned port resolved).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for both tasks to self-terminate on their idle timers.
    ///
    /// Returns their traffic statistics, or the first fatal error either
    /// task hit.
    pub async fn join(self) -> Result<(SenderStats, ReceiverStats), SubstrateError> {
        let sender = self.sender.await.map_err(|_| SubstrateError::TaskFailed)??;
        let receiver = self
            .receiver
            .await
            .map_err(|_| SubstrateError::TaskFailed)??;
        Ok((sender, receiver))
    }
}

// ---------------------------------------------------------------------------
// SubstrateHandle — the engine's view of the network
// ---------------------------------------------------------------------------

/// A lossy packet channel: two bounded queues and nothing else.
///
/// The handle can also be built from raw queue halves, which lets tests
/// drive the engine with a scripted packet sequence instead of a socket.
pub struct SubstrateHandle {
    out_tx: mpsc::Sender<Packet>,
    in_rx: mpsc::Receiver<Packet>,
}

impl SubstrateHandle {
    /// Build a handle from raw queue halves (scripted substrate).
    pub fn from_parts(out_tx: mpsc::Sender<Packet>, in_rx: mpsc::Receiver<Packet>) -> Self {
        Self { out_tx, in_rx }
    }

    /// `true` when the outbound queue can take another packet right now.
    pub fn ready(&self) -> bool {
        self.out_tx.capacity() > 0
    }

    /// Queue a packet for transmission, waiting while the queue is full.
    pub async fn send(&self, packet: Packet) {
        if self.out_tx.send(packet).await.is_err() {
            // Sender task gone; lost like any other drop, recovered by
            // retransmission.
            log::warn!("outbound queue closed; packet dropped");
        }
    }

    /// `true` when at least one inbound packet is waiting and
    /// [`receive`](SubstrateHandle::receive) would return immediately.
    pub fn incoming(&self) -> bool {
        !self.in_rx.is_empty()
    }

    /// Wait for the next inbound packet.
    ///
    /// Returns `None` once the Receiver task is gone and the queue is
    /// drained.
    pub async fn receive(&mut self) -> Option<Packet> {
        self.in_rx.recv().await
    }
}
