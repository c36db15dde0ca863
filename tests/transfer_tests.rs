//! End-to-end transfer tests.
//!
//! Each test spins up two in-process endpoints talking over the loopback
//! interface, every one with its own UDP socket, substrate tasks, and engine
//! task, so both sides make progress concurrently.  One side is configured
//! with the peer address (the client role); the other learns its peer from
//! the first packet received (the server role).

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use rdt_over_udp::engine::{Rdt, RdtConfig};
use rdt_over_udp::packet::Packet;
use rdt_over_udp::substrate::{Substrate, SubstrateConfig, SubstrateError, SubstrateHandle};

/// Bind a substrate to an OS-assigned loopback port.
async fn bound_substrate(peer: Option<SocketAddr>, disc_prob: f64) -> (Substrate, SubstrateHandle) {
    let config = SubstrateConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        peer,
        disc_prob,
    };
    Substrate::bind(config).await.expect("bind failed")
}

// ---------------------------------------------------------------------------
// Test 1: clean channel — in order, no retransmissions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_channel_delivers_in_order() {
    let (sub_b, handle_b) = bound_substrate(None, 0.0).await;
    let (sub_a, handle_a) = bound_substrate(Some(sub_b.local_addr()), 0.0).await;

    let cfg = RdtConfig {
        w_size: 4,
        timeout: Duration::from_millis(500),
    };
    let a = Rdt::start(cfg.clone(), handle_a);
    let mut b = Rdt::start(cfg, handle_b);

    for i in 0..10 {
        a.send(format!("testing {i}")).await.expect("send");
    }
    for i in 0..10 {
        let msg = b.receive().await.expect("engine alive");
        assert_eq!(msg, format!("testing {i}"));
    }

    // Stopping drains the window, so every packet is acked before the
    // substrates go idle.
    a.stop().await;
    b.stop().await;
    let (a_sender, a_receiver) = sub_a.join().await.expect("substrate A");
    let (b_sender, b_receiver) = sub_b.join().await.expect("substrate B");

    assert_eq!(a_sender.data_sent, 10, "clean channel must not retransmit");
    assert_eq!(a_sender.data_discarded, 0);
    assert_eq!(b_receiver.data_received, 10);
    assert_eq!(b_sender.acks_sent, 10);
    assert_eq!(a_receiver.acks_received, 10);
}

// ---------------------------------------------------------------------------
// Test 2: lossy channel — recovery through retransmission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lossy_channel_recovers_and_preserves_order() {
    let (sub_b, handle_b) = bound_substrate(None, 0.3).await;
    let (sub_a, handle_a) = bound_substrate(Some(sub_b.local_addr()), 0.3).await;

    let cfg = RdtConfig {
        w_size: 4,
        timeout: Duration::from_millis(200),
    };
    let a = Rdt::start(cfg.clone(), handle_a);
    let mut b = Rdt::start(cfg, handle_b);

    for i in 0..10 {
        a.send(format!("testing {i}")).await.expect("send");
    }
    timeout(Duration::from_secs(30), async {
        for i in 0..10 {
            let msg = b.receive().await.expect("engine alive");
            assert_eq!(msg, format!("testing {i}"));
        }
    })
    .await
    .expect("all payloads delivered despite 30% loss");

    a.stop().await;
    b.stop().await;
    drop(sub_a);
    drop(sub_b);
}

// ---------------------------------------------------------------------------
// Test 3: sequence wraparound with a tiny window
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sequence_numbers_wrap_on_a_long_transfer() {
    // window 3 → six sequence numbers; 20 payloads wrap the space three times
    let (sub_b, handle_b) = bound_substrate(None, 0.0).await;
    let (sub_a, handle_a) = bound_substrate(Some(sub_b.local_addr()), 0.0).await;

    let cfg = RdtConfig {
        w_size: 3,
        timeout: Duration::from_millis(500),
    };
    let a = Rdt::start(cfg.clone(), handle_a);
    let mut b = Rdt::start(cfg, handle_b);

    for i in 0..20 {
        a.send(format!("testing {i}")).await.expect("send");
    }
    timeout(Duration::from_secs(10), async {
        for i in 0..20 {
            let msg = b.receive().await.expect("engine alive");
            assert_eq!(msg, format!("testing {i}"));
        }
    })
    .await
    .expect("all payloads delivered across wraparound");

    a.stop().await;
    b.stop().await;
    drop(sub_a);
    drop(sub_b);
}

// ---------------------------------------------------------------------------
// Test 4: both peers send simultaneously
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplex_transfer_both_directions_in_order() {
    let (sub_b, handle_b) = bound_substrate(None, 0.0).await;
    let (sub_a, handle_a) = bound_substrate(Some(sub_b.local_addr()), 0.0).await;

    let cfg = RdtConfig {
        w_size: 4,
        timeout: Duration::from_millis(500),
    };
    let mut a = Rdt::start(cfg.clone(), handle_a);
    let mut b = Rdt::start(cfg, handle_b);

    // B's sender idles until A's first packet teaches it the peer address;
    // queueing sends on B before that is fine.
    for i in 0..5 {
        a.send(format!("a-to-b {i}")).await.expect("send a");
        b.send(format!("b-to-a {i}")).await.expect("send b");
    }

    timeout(Duration::from_secs(10), async {
        for i in 0..5 {
            assert_eq!(b.receive().await.expect("b alive"), format!("a-to-b {i}"));
        }
        for i in 0..5 {
            assert_eq!(a.receive().await.expect("a alive"), format!("b-to-a {i}"));
        }
    })
    .await
    .expect("both directions delivered");

    a.stop().await;
    b.stop().await;
    drop(sub_a);
    drop(sub_b);
}

// ---------------------------------------------------------------------------
// Test 5: a second sender address is a fatal protocol error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn packet_from_second_sender_is_fatal() {
    let (sub, handle) = bound_substrate(None, 0.0).await;
    let addr = sub.local_addr();
    drop(handle); // no engine in this test

    let first = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let second = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let bytes = Packet::data(0, "hi".to_string()).encode().unwrap();

    first.send_to(&bytes, addr).await.unwrap();
    sleep(Duration::from_millis(100)).await; // let the peer address settle
    second.send_to(&bytes, addr).await.unwrap();

    let err = timeout(Duration::from_secs(5), sub.join())
        .await
        .expect("substrate exits promptly")
        .expect_err("second sender must be fatal");
    assert!(
        matches!(err, SubstrateError::UnexpectedPeer { .. }),
        "unexpected error: {err}"
    );
}

// ---------------------------------------------------------------------------
// Test 6: a malformed datagram is a fatal protocol error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_datagram_is_fatal() {
    let (sub, handle) = bound_substrate(None, 0.0).await;
    let addr = sub.local_addr();
    drop(handle);

    let rogue = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    // a valid packet first, so the substrate adopts this peer and its
    // sender task can wind down
    let bytes = Packet::data(0, "hi".to_string()).encode().unwrap();
    rogue.send_to(&bytes, addr).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    // type tag 7 is not a known packet type
    rogue.send_to(&[7u8, 0, 0], addr).await.unwrap();

    let err = timeout(Duration::from_secs(5), sub.join())
        .await
        .expect("substrate exits promptly")
        .expect_err("malformed packet must be fatal");
    assert!(
        matches!(err, SubstrateError::Socket(_)),
        "unexpected error: {err}"
    );
}
