//! Service facade (component C7): `connect`, `disconnect`, `reconnect`,
//! `node_send`, `node_received`, `nodes_connected`, `connected`.
//!
//! `Service` is a thin handle around `Arc<Inner>`, the way the teacher's
//! `Node` is a handle around its own shared connection state; `Inner`
//! owns the peer table, outbox, inbox, signaling client and background
//! task handles, and is where every `ReactorEvent` is dispatched.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::async_runtime::{spawn, JoinHandle};
use crate::crypto::signature::KeyPair;
use crate::error::*;
use crate::node::address::NodeAddress;
use crate::node::channel::{new_event_channel, EventTx};
use crate::node::config::ServiceConfig;
use crate::node::inbox::Inbox;
use crate::node::outbox::{coalesce_and_chunk, OutboxMap};
use crate::node::packet::{Packet, PacketKind, MAX_DATA_SIZE};
use crate::node::peer::{self, PeerState, PeerTable};
use crate::node::reactor::{ReactorEvent, ReactorLoop};
use crate::node::signaling::SignalingClient;
use crate::node::tunnel::{self, TcpTunnel};

/// Interval between sender-loop passes (spec §4.5/§5: "sleep 200 ms").
const SENDER_PERIOD: Duration = Duration::from_millis(200);

/// Handshake deadline: a `Connecting` entry with no ACK/DATA after this
/// long is reverted to `Disconnected` (§9 REDESIGN FLAG 3).
fn handshake_deadline(expiretime: u64) -> Duration {
    Duration::from_secs(expiretime * 3)
}

pub(crate) struct Inner {
    key: KeyPair,
    testnet: bool,
    expiretime: u64,
    bind_ip: IpAddr,
    relaynodes: Vec<(String, u16)>,

    peers: PeerTable,
    outbox: OutboxMap,
    inbox: Inbox,

    irc: SyncMutex<Option<Arc<SignalingClient>>>,
    events_tx: SyncMutex<Option<EventTx<ReactorEvent>>>,

    running: AtomicBool,
    sender_stop: Arc<AtomicBool>,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    fn events_tx(&self) -> Option<EventTx<ReactorEvent>> {
        self.events_tx.lock().clone()
    }

    fn irc(&self) -> Option<Arc<SignalingClient>> {
        self.irc.lock().clone()
    }

    fn own_channel(&self) -> String {
        self.key.address().channel_name()
    }

    /// Encodes `packet` as the base64 payload carried over IRC.
    fn encode_b64(packet: &Packet) -> String {
        BASE64.encode(packet.encode())
    }

    fn decode_packet(&self, payload_b64: &str) -> Option<Packet> {
        let bytes = BASE64.decode(payload_b64).ok()?;
        Packet::parse(&bytes, self.expiretime, self.testnet)
    }

    // ---- reactor dispatch -------------------------------------------------

    async fn dispatch(self: &Arc<Self>, event: ReactorEvent) {
        match event {
            ReactorEvent::Pubmsg {
                target,
                source_nick,
                payload_b64,
            } => {
                if target != self.own_channel() {
                    return;
                }
                let Some(packet) = self.decode_packet(&payload_b64) else {
                    return;
                };
                if packet.kind() != PacketKind::Syn {
                    return;
                }
                self.on_syn(packet.node().clone(), source_nick).await;
            }
            ReactorEvent::DccCtcp {
                source_nick: _,
                synack_b64,
                peer_ip,
                peer_port,
            } => {
                let Some(packet) = self.decode_packet(&synack_b64) else {
                    return;
                };
                if packet.kind() != PacketKind::SynAck {
                    return;
                }
                self.on_synack(packet.node().clone(), peer_ip, peer_port).await;
            }
            ReactorEvent::NicknameInUse => {
                tracing::warn!("unexpected post-registration nicknameinuse");
            }
            ReactorEvent::IrcDisconnect => {
                tracing::info!("irc relay connection dropped");
            }
            ReactorEvent::TunnelAck { peer } => {
                self.peers.set_connected(&peer, None);
            }
            ReactorEvent::TunnelData { peer, bytes } => {
                self.peers.set_connected(&peer, None);
                self.inbox.push(peer, bytes);
            }
            ReactorEvent::TunnelClosed { peer } => {
                if let Some(entry) = self.peers.remove(&peer) {
                    if let Some(tunnel) = entry.tunnel {
                        tunnel.close().await;
                    }
                }
            }
        }
    }

    // ---- C4 transitions ----------------------------------------------------

    /// Initiator path: `node_send` observed a `Disconnected` peer.
    async fn node_connect(&self, addr: NodeAddress) {
        let Some(irc) = self.irc() else { return };
        if self.send_syn(&irc, &addr).await {
            self.peers.set_connecting(addr, None);
        }
        // else: no entry created, bytes remain queued for the next pass.
    }

    async fn send_syn(&self, irc: &SignalingClient, addr: &NodeAddress) -> bool {
        let channel = addr.channel_name();
        let syn = Packet::build_syn(&self.key, self.testnet);
        let payload = Self::encode_b64(&syn);
        let joined = irc.join(&channel).await.is_ok();
        let sent = joined && irc.privmsg(&channel, &payload).await.is_ok();
        let _ = irc.part(&channel).await;
        sent
    }

    /// Responder path, or the simultaneous-connect resolver.
    async fn on_syn(self: &Arc<Self>, sender: NodeAddress, source_nick: String) {
        match self.peers.state(&sender) {
            PeerState::Disconnected => self.responder_accept(sender, source_nick).await,
            PeerState::Connecting | PeerState::Connected => {
                self.resolve_simultaneous_connect(sender).await;
            }
        }
    }

    async fn responder_accept(self: &Arc<Self>, sender: NodeAddress, source_nick: String) {
        let Some(irc) = self.irc() else { return };

        let (local_addr, listener) = match tunnel::listen(SocketAddr::new(self.bind_ip, 0)).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to open a listening dcc tunnel");
                return;
            }
        };
        let ip = match local_addr.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => {
                tracing::warn!("dcc requires an ipv4 bind address");
                return;
            }
        };

        let synack = Packet::build_synack(&self.key, self.testnet);
        let synack_b64 = Self::encode_b64(&synack);
        if irc
            .ctcp_dcc_chat(&source_nick, &synack_b64, ip, local_addr.port())
            .await
            .is_err()
        {
            return;
        }

        self.peers.set_connecting(sender.clone(), None);

        let inner = self.clone();
        let deadline = handshake_deadline(self.expiretime);
        spawn(async move {
            let accepted = tokio::time::timeout(deadline, listener.accept()).await;
            match accepted {
                Ok(Ok(stream)) => {
                    let Some(events_tx) = inner.events_tx() else { return };
                    let tunnel = TcpTunnel::spawn(
                        stream,
                        sender.clone(),
                        inner.testnet,
                        inner.expiretime,
                        events_tx,
                    );
                    inner.peers.attach_tunnel(&sender, tunnel);
                }
                _ => {
                    inner.peers.remove(&sender);
                }
            }
        });
    }

    /// Back-connect path: a valid SYNACK arrived over CTCP.
    async fn on_synack(self: &Arc<Self>, sender: NodeAddress, ip: String, port: u16) {
        if self.peers.state(&sender) != PeerState::Connecting {
            // out of band: the message doesn't correspond to a handshake
            // we're currently waiting on.
            self.peers.remove(&sender);
            return;
        }

        let Ok(parsed_ip) = ip.parse::<IpAddr>() else {
            self.peers.remove(&sender);
            return;
        };
        let addr = SocketAddr::new(parsed_ip, port);

        let stream = match tunnel::connect(addr).await {
            Ok(s) => s,
            Err(_) => {
                self.peers.remove(&sender);
                return;
            }
        };

        let Some(events_tx) = self.events_tx() else { return };
        let tunnel = TcpTunnel::spawn(stream, sender.clone(), self.testnet, self.expiretime, events_tx);

        let ack = Packet::build_ack(&self.key, self.testnet);
        if tunnel.send_bytes(ack.encode()).await.is_ok() {
            self.peers.set_connected(&sender, Some(tunnel));
        } else {
            self.peers.remove(&sender);
        }
    }

    /// Both sides initiated before either observed the other's SYN.
    /// Both abort; only the lexicographically-smaller address restarts.
    async fn resolve_simultaneous_connect(self: &Arc<Self>, sender: NodeAddress) {
        if let Some(entry) = self.peers.remove(&sender) {
            if let Some(tunnel) = entry.tunnel {
                tunnel.close().await;
            }
        }
        if peer::is_restarter(self.key.address(), &sender) {
            self.node_connect(sender).await;
        }
        // the non-restarter simply waits for the restarter's fresh SYN.
    }

    // ---- C5 sender loop ------------------------------------------------------

    async fn sender_pass(self: &Arc<Self>) {
        self.peers.reap_expired_handshakes(handshake_deadline(self.expiretime));

        let Some(_irc) = self.irc() else { return };
        for addr in self.outbox.known_addresses() {
            match self.peers.state(&addr) {
                PeerState::Connecting => continue,
                PeerState::Disconnected => self.node_connect(addr).await,
                PeerState::Connected => self.drain_and_send(&addr).await,
            }
        }
    }

    async fn drain_and_send(&self, addr: &NodeAddress) {
        let buffers = self.outbox.drain_all(addr);
        if buffers.is_empty() {
            return;
        }
        let Some(tunnel) = self.peers.tunnel_of(addr) else {
            // state said Connected but the tunnel vanished concurrently;
            // requeue everything untouched for the next pass.
            for buf in buffers.into_iter().rev() {
                self.outbox.requeue_front(addr, buf);
            }
            return;
        };

        let chunks = coalesce_and_chunk(buffers, MAX_DATA_SIZE);
        for (i, chunk) in chunks.iter().enumerate() {
            let packet = match Packet::build_data(&self.key, chunk, self.testnet) {
                Ok(p) => p,
                Err(_) => unreachable!("chunk size is bounded by MAX_DATA_SIZE by construction"),
            };
            if tunnel.send_bytes(packet.encode()).await.is_err() {
                // requeue this chunk and everything after it (§9 item 1:
                // requeue on failure rather than silently drop).
                for remaining in chunks[i..].iter().rev() {
                    self.outbox.requeue_front(addr, remaining.clone());
                }
                self.peers.remove(addr);
                tunnel.close().await;
                return;
            }
        }
    }
}

/// A peer-to-peer node messaging service.
///
/// Construct with [`ServiceConfig`], call [`Service::connect`] to join
/// the signaling plane, then use [`Service::node_send`]/
/// [`Service::node_received`] to exchange data.
pub struct Service {
    inner: Arc<Inner>,
}

impl Service {
    pub fn new(config: ServiceConfig) -> Self {
        Service {
            inner: Arc::new(Inner {
                key: config.key,
                testnet: config.testnet,
                expiretime: config.expiretime,
                bind_ip: config.bind_ip,
                relaynodes: config.relaynodes,
                peers: PeerTable::new(),
                outbox: OutboxMap::new(),
                inbox: Inbox::new(),
                irc: SyncMutex::new(None),
                events_tx: SyncMutex::new(None),
                running: AtomicBool::new(false),
                sender_stop: Arc::new(AtomicBool::new(false)),
                tasks: AsyncMutex::new(Vec::new()),
            }),
        }
    }

    pub fn address(&self) -> &NodeAddress {
        self.inner.key.address()
    }

    /// Selects a relay, registers, joins the service's own channel, and
    /// starts the reactor and sender background tasks.
    pub async fn connect(&self) -> Result<()> {
        let (events_tx, events_rx) = new_event_channel();
        let nick = crate::node::signaling::irc_client::random_nick();
        let (irc, _registered_nick) =
            SignalingClient::connect(&self.inner.relaynodes, &nick, events_tx.clone()).await?;

        irc.join(&self.inner.own_channel()).await.wrapped(ErrorKind::Signaling)?;

        *self.inner.irc.lock() = Some(irc);
        *self.inner.events_tx.lock() = Some(events_tx);
        self.inner.running.store(true, Ordering::SeqCst);
        self.inner.sender_stop.store(false, Ordering::SeqCst);

        let reactor_inner = self.inner.clone();
        let reactor_handle = spawn(async move {
            ReactorLoop::new(events_rx).run(reactor_inner).await;
        });

        let sender_inner = self.inner.clone();
        let sender_stop = self.inner.sender_stop.clone();
        let sender_handle = spawn(async move {
            let mut interval = tokio::time::interval(SENDER_PERIOD);
            while !sender_stop.load(Ordering::SeqCst) {
                interval.tick().await;
                sender_inner.sender_pass().await;
            }
        });

        let mut tasks = self.inner.tasks.lock().await;
        tasks.push(reactor_handle);
        tasks.push(sender_handle);
        Ok(())
    }

    /// Stops both background loops, tears down every tunnel, and closes
    /// the IRC connection. Never fails.
    pub async fn disconnect(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.sender_stop.store(true, Ordering::SeqCst);

        if let Some(irc) = self.inner.irc() {
            irc.disconnect().await;
        }
        *self.inner.irc.lock() = None;

        for (_, entry) in self.inner.peers.drain() {
            if let Some(tunnel) = entry.tunnel {
                tunnel.close().await;
            }
        }

        *self.inner.events_tx.lock() = None;

        let mut tasks = self.inner.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.disconnect().await;
        self.connect().await
    }

    /// Enqueues `bytes` for delivery to `addr`. The queue is created
    /// lazily and persists for the service's lifetime.
    pub fn node_send(&self, addr: &str, bytes: Vec<u8>) -> Result<()> {
        let addr = NodeAddress::parse(addr)?;
        self.inner.outbox.enqueue(addr, bytes);
        Ok(())
    }

    /// Drains the inbox, returning each sender's concatenated bytes.
    pub fn node_received(&self) -> crate::collections::HashMap<NodeAddress, Vec<u8>> {
        self.inner.inbox.drain()
    }

    pub fn nodes_connected(&self) -> Vec<NodeAddress> {
        self.inner.peers.connected_addresses()
    }

    pub fn connected(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
            && self.inner.irc().map(|irc| irc.is_connected()).unwrap_or(false)
    }
}
