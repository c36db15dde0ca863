//! `rdt-over-udp` — reliable, ordered delivery of text payloads over lossy UDP.
//!
//! A sliding-window protocol with selective repeat: every DATA packet is
//! acked individually, out-of-order arrivals are buffered and resequenced,
//! and only the packets whose own timers expire are retransmitted.  Sequence
//! numbers live in a 15-bit space twice the window size.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │ send() / receive()
//!  ┌───▼──────────┐
//!  │     Rdt      │  engine task: sliding window, resend timers,
//!  │   (engine)   │  ack generation, in-order delivery
//!  └───┬──────────┘
//!      │ packet queues (SubstrateHandle)
//!  ┌───▼──────────┐
//!  │  Substrate   │  Sender task (loss injection) + Receiver task
//!  └───┬──────────┘  (peer learning), one shared UDP socket
//!      │ raw UDP datagrams
//!      ▼
//!     peer
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]      — wire format (serialise / deserialise)
//! - [`seq`]         — wrap-around sequence-number arithmetic
//! - [`send_window`] — outstanding packets and resend timers
//! - [`recv_window`] — out-of-order resequencing buffer
//! - [`engine`]      — the protocol event loop and application API
//! - [`sender`]      — outbound I/O task with loss injection
//! - [`receiver`]    — inbound I/O task with peer learning
//! - [`substrate`]   — task spawning and the engine's channel seam
//! - [`socket`]      — async UDP socket abstraction

pub mod engine;
pub mod packet;
pub mod receiver;
pub mod recv_window;
pub mod send_window;
pub mod sender;
pub mod seq;
pub mod socket;
pub mod substrate;
