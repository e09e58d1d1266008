//! Per-peer connection state machine (component C4): the load-bearing
//! component of the design.
//!
//! `PeerTable` only holds the data; it does not perform any network I/O.
//! The actual transitions — joining the peer's channel, sending a SYN,
//! opening a listening DCC socket — are orchestrated by `service::Inner`,
//! which calls into this table once it has already done the I/O, exactly
//! the way the spec describes each transition as "send SYN, *then*
//! record `{Connecting, tunnel: None}`".

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::collections::HashMap;
use crate::node::address::NodeAddress;
use crate::node::tunnel::TcpTunnel;

/// The state of a single peer connection.
///
/// ```text
///            node_send / got SYN
///  Disconnected ───────────────▶ Connecting ───────────▶ Connected
///       ▲                           │  ACK / DATA            │
///       │          disconnect /     │                        │
///       └──── close tunnel ─────────┴────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PeerState {
    Disconnected,
    Connecting,
    Connected,
}

/// Everything the service tracks about one remote peer.
pub struct PeerEntry {
    pub state: PeerState,
    pub tunnel: Option<Arc<TcpTunnel>>,
    /// When this entry last transitioned into `Connecting`; drives the
    /// handshake-deadline sweep (§9 REDESIGN: `expiretime * 3` with no
    /// ACK/DATA reverts the entry to `Disconnected`).
    connecting_since: Option<Instant>,
}

/// The `_dcc_connections`-equivalent shared map, guarded by a single
/// lock (spec §5: "a separate mutex protects `_dcc_connections`").
///
/// Entries absent from the map are, by convention, `Disconnected` — this
/// mirrors the original's `_node_state` returning `DISCONNECTED` for an
/// unknown address rather than requiring every peer ever seen to have an
/// explicit entry.
pub struct PeerTable {
    inner: Mutex<HashMap<NodeAddress, PeerEntry>>,
}

impl PeerTable {
    pub fn new() -> Self {
        PeerTable {
            inner: Mutex::new(HashMap::default()),
        }
    }

    /// Returns the current state of `addr`, or `Disconnected` if no
    /// entry exists.
    pub fn state(&self, addr: &NodeAddress) -> PeerState {
        self.inner
            .lock()
            .get(addr)
            .map(|e| e.state)
            .unwrap_or(PeerState::Disconnected)
    }

    /// Records a newly-initiated handshake. Overwrites any prior entry.
    pub fn set_connecting(&self, addr: NodeAddress, tunnel: Option<Arc<TcpTunnel>>) {
        self.inner.lock().insert(
            addr,
            PeerEntry {
                state: PeerState::Connecting,
                tunnel,
                connecting_since: Some(Instant::now()),
            },
        );
    }

    /// Attaches `tunnel` to an existing, still-live entry (the
    /// responder path: the listening DCC is accepted asynchronously,
    /// after `set_connecting` already recorded the bare handshake).
    /// No-op if the entry was torn down in the meantime (e.g. by a
    /// simultaneous-connect abort or a handshake-deadline sweep).
    pub fn attach_tunnel(&self, addr: &NodeAddress, tunnel: Arc<TcpTunnel>) -> bool {
        match self.inner.lock().get_mut(addr) {
            Some(entry) => {
                entry.tunnel = Some(tunnel);
                true
            }
            None => false,
        }
    }

    /// Removes every entry that has been `Connecting` for longer than
    /// `deadline`, returning their addresses so the caller can log/retry.
    pub fn reap_expired_handshakes(&self, deadline: Duration) -> Vec<NodeAddress> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let expired: Vec<NodeAddress> = guard
            .iter()
            .filter(|(_, e)| {
                e.state == PeerState::Connecting
                    && e.connecting_since
                        .map(|since| now.duration_since(since) > deadline)
                        .unwrap_or(false)
            })
            .map(|(addr, _)| addr.clone())
            .collect();
        for addr in &expired {
            guard.remove(addr);
        }
        expired
    }

    /// Transitions `addr` to `Connected`, attaching `tunnel` if the entry
    /// didn't already have one (the back-connect path attaches its new
    /// outgoing DCC at the same time it marks the peer connected).
    ///
    /// Returns `false` if there was no entry for `addr` at all (a bare
    /// ACK/DATA arriving for an address we never started a handshake
    /// with — the read loop still owns a tunnel in that case, so the
    /// caller is expected to tolerate this as "already live" per spec
    /// §4.4's finalization note).
    pub fn set_connected(&self, addr: &NodeAddress, tunnel: Option<Arc<TcpTunnel>>) -> bool {
        let mut guard = self.inner.lock();
        match guard.get_mut(addr) {
            Some(entry) => {
                entry.state = PeerState::Connected;
                if entry.tunnel.is_none() {
                    entry.tunnel = tunnel;
                }
                true
            }
            None => {
                if let Some(tunnel) = tunnel {
                    guard.insert(
                        addr.clone(),
                        PeerEntry {
                            state: PeerState::Connected,
                            tunnel: Some(tunnel),
                            connecting_since: None,
                        },
                    );
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Removes `addr`'s entry entirely (tunnel close, explicit
    /// disconnect, or simultaneous-connect abort). Returns the removed
    /// entry, if any, so the caller can close its tunnel.
    pub fn remove(&self, addr: &NodeAddress) -> Option<PeerEntry> {
        self.inner.lock().remove(addr)
    }

    /// Returns the tunnel handle for `addr`, if connected or connecting.
    pub fn tunnel_of(&self, addr: &NodeAddress) -> Option<Arc<TcpTunnel>> {
        self.inner.lock().get(addr).and_then(|e| e.tunnel.clone())
    }

    /// Snapshot of every peer address currently `Connected`.
    pub fn connected_addresses(&self) -> Vec<NodeAddress> {
        self.inner
            .lock()
            .iter()
            .filter(|(_, e)| e.state == PeerState::Connected)
            .map(|(addr, _)| addr.clone())
            .collect()
    }

    /// Snapshot of every address with a live entry, used by the sender
    /// loop to iterate the peer table without holding its lock across
    /// the rest of the pass (spec §9: "never hold the IRC lock across a
    /// full outbox pass").
    pub fn known_addresses(&self) -> Vec<NodeAddress> {
        self.inner.lock().keys().cloned().collect()
    }

    /// Removes every entry, returning their tunnels so the caller can
    /// close them. Used by `Service::disconnect`.
    pub fn drain(&self) -> Vec<(NodeAddress, PeerEntry)> {
        self.inner.lock().drain().collect()
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The simultaneous-connect tie-break: given both addresses, decides
/// whether `own` is the side responsible for restarting the handshake.
///
/// Both sides compute the same comparison over the same two strings, so
/// they always agree on exactly one restarter — the lexicographically
/// smaller address.
pub fn is_restarter(own: &NodeAddress, peer: &NodeAddress) -> bool {
    own.as_str() < peer.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signature::KeyPair;

    fn addr(seed: bool) -> NodeAddress {
        KeyPair::generate(seed).address().clone()
    }

    #[test]
    fn unknown_peer_is_disconnected() {
        let table = PeerTable::new();
        assert_eq!(table.state(&addr(false)), PeerState::Disconnected);
    }

    #[test]
    fn connecting_then_connected_round_trip() {
        let table = PeerTable::new();
        let peer = addr(false);
        table.set_connecting(peer.clone(), None);
        assert_eq!(table.state(&peer), PeerState::Connecting);
        assert!(table.set_connected(&peer, None));
        assert_eq!(table.state(&peer), PeerState::Connected);
    }

    #[test]
    fn remove_drops_back_to_disconnected() {
        let table = PeerTable::new();
        let peer = addr(false);
        table.set_connecting(peer.clone(), None);
        table.remove(&peer);
        assert_eq!(table.state(&peer), PeerState::Disconnected);
    }

    #[test]
    fn tie_break_agrees_both_directions() {
        let a = addr(false);
        let b = addr(false);
        // exactly one side restarts, and both sides compute the same
        // answer when asked from either perspective
        assert_ne!(is_restarter(&a, &b), is_restarter(&b, &a));
    }
}
