//! `signode`: a peer-to-peer node messaging service.
//!
//! Two parties, each identified by a Bitcoin-style address derived from a
//! private key, exchange arbitrary binary data over direct, authenticated
//! TCP connections. Peers sit behind NATs and do not know each other's
//! IP addresses, so the signaling and connection-lifecycle engine uses a
//! public IRC network as a rendezvous plane: peers announce themselves on
//! a channel derived from their own address, negotiate a DCC tunnel via
//! signed control packets, then stream bulk data across that tunnel.
//!
//! The entry point is [`node::service::Service`]; build one from a
//! [`node::config::ServiceConfig`], call `connect`, then use `node_send`/
//! `node_received` to exchange data with a peer address.

pub mod async_runtime;
pub mod collections;
pub mod crypto;
pub mod error;
pub mod node;

pub use node::address::NodeAddress;
pub use node::config::ServiceConfig;
pub use node::service::Service;
