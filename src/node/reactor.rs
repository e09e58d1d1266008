//! The single event pump (component C6).
//!
//! `ReactorEvent`s are produced concurrently by several tasks — the IRC
//! signaling client's read loop, and one read loop per active DCC
//! tunnel — and consumed one at a time here. The critical property this
//! preserves, per design, is that the pump itself never holds the
//! peer-table or IRC-connection mutex across a dispatch: each event is
//! matched, the relevant lock is taken just long enough to apply the
//! transition, then released before the next `recv().await`.

use crate::node::address::NodeAddress;
use crate::node::channel::EventRx;
use crate::node::service::Inner;

/// Events fed into the reactor from the signaling transport and from
/// per-tunnel read loops.
#[derive(Debug)]
pub enum ReactorEvent {
    /// A `PUBMSG` addressed to `target`.
    Pubmsg {
        target: String,
        source_nick: String,
        payload_b64: String,
    },
    /// A CTCP `DCC` message, already split into its shell-quoted parts.
    DccCtcp {
        source_nick: String,
        synack_b64: String,
        peer_ip: String,
        peer_port: u16,
    },
    /// The nick we requested was already taken.
    NicknameInUse,
    /// The IRC relay connection dropped.
    IrcDisconnect,
    /// A valid ACK arrived on `peer`'s tunnel.
    TunnelAck { peer: NodeAddress },
    /// A valid DATA packet arrived on `peer`'s tunnel.
    TunnelData { peer: NodeAddress, bytes: Vec<u8> },
    /// `peer`'s tunnel reported a disconnect (`dcc_disconnect`).
    TunnelClosed { peer: NodeAddress },
}

/// Drives the event pump until told to stop.
///
/// Owns the receiving half of the shared event channel; dispatch logic
/// itself lives on `Inner` (`Inner::dispatch`), so the loop here stays a
/// thin `recv` → `dispatch` → `recv` cycle, mirroring the teacher's own
/// `rx_side_accept` shape: a loop body that never itself holds a lock.
pub struct ReactorLoop {
    events: EventRx<ReactorEvent>,
}

impl ReactorLoop {
    pub fn new(events: EventRx<ReactorEvent>) -> Self {
        ReactorLoop { events }
    }

    pub async fn run(mut self, inner: std::sync::Arc<Inner>) {
        while let Some(event) = self.events.recv().await {
            inner.dispatch(event).await;
        }
    }
}
