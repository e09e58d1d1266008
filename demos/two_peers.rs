//! Manual end-to-end exercise of the signaling engine: spins up a
//! throwaway loopback IRC relay, connects two `Service`s to it, and has
//! them exchange a short message both ways.
//!
//! Run with `cargo run --example two_peers`.

#[path = "../tests/support/fake_irc.rs"]
mod fake_irc;

use std::time::Duration;

use signode::crypto::signature::KeyPair;
use signode::{Service, ServiceConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let relay = fake_irc::spawn_fake_relay().await;
    println!("fake relay listening on {}", relay);

    let alice_key = KeyPair::generate(false);
    let bob_key = KeyPair::generate(false);
    let alice_addr = alice_key.address().clone();
    let bob_addr = bob_key.address().clone();

    let config = |key| ServiceConfig {
        relaynodes: vec![("127.0.0.1".to_owned(), relay.port())],
        key,
        testnet: false,
        expiretime: 20,
        bind_ip: "127.0.0.1".parse().unwrap(),
    };

    let alice = Service::new(config(alice_key));
    let bob = Service::new(config(bob_key));

    alice.connect().await.expect("alice connects to the relay");
    bob.connect().await.expect("bob connects to the relay");
    println!("{} and {} are both on the signaling plane", alice_addr, bob_addr);

    alice.node_send(bob_addr.as_str(), b"hello from alice".to_vec()).unwrap();

    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let inbox = bob.node_received();
        if let Some(bytes) = inbox.get(&alice_addr) {
            println!("bob received: {}", String::from_utf8_lossy(bytes));
            break;
        }
    }

    bob.node_send(alice_addr.as_str(), b"hello from bob".to_vec()).unwrap();

    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let inbox = alice.node_received();
        if let Some(bytes) = inbox.get(&bob_addr) {
            println!("alice received: {}", String::from_utf8_lossy(bytes));
            break;
        }
    }

    alice.disconnect().await;
    bob.disconnect().await;
}
