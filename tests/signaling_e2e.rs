//! End-to-end scenarios driving real `Service` instances against a
//! loopback fake IRC relay (see `support::fake_irc`), covering the
//! literal scenarios of the design: a simple exchange, coalescing a
//! burst of small sends, chunking an oversized one, the simultaneous-
//! connect tie-break, and relay exhaustion.
//!
//! Real wall-clock sleeps are replaced with short polling loops against
//! loopback, since there is no network latency to wait out here.

#[path = "support/fake_irc.rs"]
mod fake_irc;

use std::net::IpAddr;
use std::time::{Duration, Instant};

use signode::crypto::signature::KeyPair;
use signode::node::packet::MAX_DATA_SIZE;
use signode::{Service, ServiceConfig};

const LOCALHOST: IpAddr = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
const POLL_TIMEOUT: Duration = Duration::from_secs(10);

async fn wait_until<F: Fn() -> bool>(f: F) -> bool {
    let deadline = Instant::now() + POLL_TIMEOUT;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    f()
}

fn config_for(relay_port: u16, key: KeyPair) -> ServiceConfig {
    ServiceConfig {
        relaynodes: vec![("127.0.0.1".to_owned(), relay_port)],
        key,
        testnet: false,
        expiretime: 20,
        bind_ip: LOCALHOST,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn s1_simple_exchange() {
    let relay = fake_irc::spawn_fake_relay().await;

    let alice_key = KeyPair::generate(false);
    let bob_key = KeyPair::generate(false);
    let alice_addr = alice_key.address().clone();
    let bob_addr = bob_key.address().clone();

    let alice = Service::new(config_for(relay.port(), alice_key));
    let bob = Service::new(config_for(relay.port(), bob_key));

    alice.connect().await.expect("alice connects");
    bob.connect().await.expect("bob connects");

    alice.node_send(bob_addr.as_str(), b"alice".to_vec()).expect("valid address");

    assert!(
        wait_until(|| bob.nodes_connected().contains(&alice_addr)).await,
        "bob never saw alice connect"
    );

    bob.node_send(alice_addr.as_str(), b"bob".to_vec()).expect("valid address");

    let alice_inbox = poll_inbox(&alice, &bob_addr, b"bob").await;
    let bob_inbox = poll_inbox(&bob, &alice_addr, b"alice").await;

    assert_eq!(alice_inbox, b"bob");
    assert_eq!(bob_inbox, b"alice");
    assert!(alice.nodes_connected().contains(&bob_addr));
    assert!(bob.nodes_connected().contains(&alice_addr));

    alice.disconnect().await;
    bob.disconnect().await;
}

/// Repeatedly drains `svc`'s inbox until `sender`'s accumulated bytes
/// equal `expected`, or the poll budget runs out.
async fn poll_inbox(svc: &Service, sender: &signode::NodeAddress, expected: &[u8]) -> Vec<u8> {
    let mut acc: Vec<u8> = Vec::new();
    let deadline = Instant::now() + POLL_TIMEOUT;
    while Instant::now() < deadline {
        for (from, bytes) in svc.node_received() {
            if &from == sender {
                acc.extend_from_slice(&bytes);
            }
        }
        if acc == expected {
            return acc;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    acc
}

#[tokio::test(flavor = "multi_thread")]
async fn s3_coalesces_a_burst_of_small_sends() {
    let relay = fake_irc::spawn_fake_relay().await;

    let alice_key = KeyPair::generate(false);
    let bob_key = KeyPair::generate(false);
    let alice_addr = alice_key.address().clone();
    let bob_addr = bob_key.address().clone();

    let alice = Service::new(config_for(relay.port(), alice_key));
    let bob = Service::new(config_for(relay.port(), bob_key));
    alice.connect().await.expect("alice connects");
    bob.connect().await.expect("bob connects");

    // five 100-byte buffers enqueued back-to-back, before any handshake
    // has had a chance to complete.
    let mut expected = Vec::new();
    for i in 0..5u8 {
        let buf = vec![i; 100];
        expected.extend_from_slice(&buf);
        alice.node_send(bob_addr.as_str(), buf).expect("valid address");
    }

    let received = poll_inbox(&bob, &alice_addr, &expected).await;
    assert_eq!(received, expected);

    alice.disconnect().await;
    bob.disconnect().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn s4_chunks_an_oversized_send() {
    let relay = fake_irc::spawn_fake_relay().await;

    let alice_key = KeyPair::generate(false);
    let bob_key = KeyPair::generate(false);
    let alice_addr = alice_key.address().clone();
    let bob_addr = bob_key.address().clone();

    let alice = Service::new(config_for(relay.port(), alice_key));
    let bob = Service::new(config_for(relay.port(), bob_key));
    alice.connect().await.expect("alice connects");
    bob.connect().await.expect("bob connects");

    let big: Vec<u8> = (0..(2 * MAX_DATA_SIZE + 1)).map(|i| (i % 251) as u8).collect();
    alice.node_send(bob_addr.as_str(), big.clone()).expect("valid address");

    let received = poll_inbox(&bob, &alice_addr, &big).await;
    assert_eq!(received, big);

    alice.disconnect().await;
    bob.disconnect().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn s2_simultaneous_connect_converges_on_one_handshake() {
    let relay = fake_irc::spawn_fake_relay().await;

    let alice_key = KeyPair::generate(false);
    let bob_key = KeyPair::generate(false);
    let alice_addr = alice_key.address().clone();
    let bob_addr = bob_key.address().clone();

    let alice = Service::new(config_for(relay.port(), alice_key));
    let bob = Service::new(config_for(relay.port(), bob_key));
    alice.connect().await.expect("alice connects");
    bob.connect().await.expect("bob connects");

    // both sides initiate in the same tick, racing to SYN each other
    // before either has observed the other's SYN.
    alice.node_send(bob_addr.as_str(), b"x".to_vec()).expect("valid address");
    bob.node_send(alice_addr.as_str(), b"x".to_vec()).expect("valid address");

    assert!(
        wait_until(|| alice.nodes_connected().contains(&bob_addr) && bob.nodes_connected().contains(&alice_addr))
            .await,
        "both sides should converge on exactly one handshake despite racing"
    );

    alice.disconnect().await;
    bob.disconnect().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn s6_relay_exhaustion_surfaces_as_connection_error() {
    let dead = fake_irc::closed_port().await;
    let key = KeyPair::generate(false);
    let svc = Service::new(config_for(dead.port(), key));

    let result = tokio::time::timeout(Duration::from_secs(15), svc.connect()).await;
    match result {
        Ok(Err(_)) => {}
        Ok(Ok(())) => panic!("connect unexpectedly succeeded against a closed port"),
        Err(_) => panic!("connect did not return within the bounded timeout"),
    }
}
