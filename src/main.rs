//! Entry point for `rdt-over-udp`.
//!
//! Runs one endpoint of the protocol and drives it with a test source/sink:
//! payloads of the form `testing N` are generated at a fixed interval on one
//! side and checked for exact order on the other.  Two processes form a
//! pair; start the server (no `--peer`) first, then the client, which
//! teaches the server its address with the first packet.
//!
//! All actual protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing) and the source/sink loop.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

use rdt_over_udp::engine::{Rdt, RdtConfig};
use rdt_over_udp::substrate::{Substrate, SubstrateConfig};

/// Reliable data transport over UDP, driven by a `testing N` source/sink.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Local address to bind (port 0 for an OS-assigned port).
    #[arg(short, long, default_value = "127.0.0.1:0")]
    bind: std::net::SocketAddr,

    /// Peer address; omit on the server side, which learns it from the
    /// first packet received.
    #[arg(short, long)]
    peer: Option<std::net::SocketAddr>,

    /// Protocol window size in packets; use the same value on both ends.
    #[arg(short, long, default_value_t = 4)]
    window: u16,

    /// Retransmission timeout in seconds.
    #[arg(short, long, default_value_t = 0.5)]
    timeout: f64,

    /// Probability that an outgoing packet is discarded before the socket.
    #[arg(long, default_value_t = 0.0)]
    disc_prob: f64,

    /// Seconds between generated payloads; 0 generates nothing.
    #[arg(long, default_value_t = 0.0)]
    delta: f64,

    /// Seconds during which payloads are generated.
    #[arg(long, default_value_t = 0.0)]
    run_length: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set RUST_LOG=debug to print every packet sent and received.
    env_logger::init();
    let cli = Cli::parse();

    let (substrate, handle) = Substrate::bind(SubstrateConfig {
        bind_addr: cli.bind,
        peer: cli.peer,
        disc_prob: cli.disc_prob,
    })
    .await?;
    log::info!("listening on {}", substrate.local_addr());

    let rdt = Rdt::start(
        RdtConfig {
            w_size: cli.window,
            timeout: Duration::from_secs_f64(cli.timeout),
        },
        handle,
    );

    // Server side: hold back the source so the client's first packet can
    // teach us the peer address.
    if cli.peer.is_none() {
        sleep(Duration::from_secs(2)).await;
    }

    let (quit_tx, quit_rx) = watch::channel(false);
    let src_snk = tokio::spawn(src_snk(rdt, cli.delta, cli.run_length, quit_rx));

    // The substrate tasks self-terminate once the conversation goes idle.
    let (sender_stats, receiver_stats) = substrate.join().await?;
    log::info!(
        "substrate done: {} data packets sent, {} received",
        sender_stats.data_sent,
        receiver_stats.data_received
    );

    quit_tx.send(true).ok();
    let (rdt, sent, received) = src_snk.await?;
    rdt.stop().await;
    log::info!("src/snk: sent {sent}, received {received}");
    Ok(())
}

/// Generate `testing N` payloads and verify inbound payloads arrive in
/// exact sequence, until told to quit.
///
/// An out-of-order or corrupted payload is a protocol failure and aborts
/// the process.
async fn src_snk(
    mut rdt: Rdt,
    delta: f64,
    run_length: f64,
    quit: watch::Receiver<bool>,
) -> (Rdt, u64, u64) {
    let start = Instant::now();
    // Delay the first send so both endpoints are up.
    let mut next = Duration::from_secs(1);
    let window_end = next + Duration::from_secs_f64(run_length);
    let delta = Duration::from_secs_f64(delta);

    let mut sent = 0u64;
    let mut received = 0u64;

    while !*quit.borrow() {
        let now = start.elapsed();
        if rdt.incoming() {
            let Some(msg) = rdt.receive().await else { break };
            let expected = format!("testing {received}");
            if msg != expected {
                log::error!("got {msg:?} when expecting {expected:?}");
                std::process::exit(1);
            }
            received += 1;
        } else if !delta.is_zero() && now > next && now < window_end && rdt.ready() {
            if rdt.send(format!("testing {sent}")).await.is_err() {
                break;
            }
            sent += 1;
            next += delta;
        } else {
            sleep(Duration::from_millis(1)).await;
        }
    }
    (rdt, sent, received)
}
