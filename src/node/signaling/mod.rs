//! Signaling transport (component C2): a relay-selecting IRC client
//! whose PUBMSG/CTCP traffic carries the handshake packets.
//!
//! Mirrors the teacher's habit of keeping a concrete socket backend
//! behind its own module (`communication::socket::async_std_tcp`) while
//! the rest of the crate only depends on the events it produces.

pub mod irc_client;

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::seq::SliceRandom;
use rand::thread_rng;
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpStream,
};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::error::*;
use crate::node::channel::EventTx;
use crate::node::reactor::ReactorEvent;
use irc_client::{
    encode_numeric_ip, nick_from_prefix, parse_ctcp_dcc_chat, parse_line, random_nick, wrap_ctcp,
};

/// Bounded per spec §9 item 4: an unbounded `nicknameinuse` retry loop
/// could spin forever against a hostile or crowded relay.
const MAX_NICK_ATTEMPTS: usize = 10;

type Writer = FramedWrite<OwnedWriteHalf, LinesCodec>;
type Reader = FramedRead<OwnedReadHalf, LinesCodec>;

/// A live connection to exactly one IRC relay.
pub struct SignalingClient {
    writer: Arc<AsyncMutex<Writer>>,
    connected: Arc<AtomicBool>,
}

impl SignalingClient {
    /// Tries every relay in `relays`, in random order, until one accepts
    /// a TCP connection and completes IRC registration under `nick`.
    /// Returns the connected client and the nick it finally registered
    /// under (it may differ from `nick` after collisions).
    ///
    /// Spawns the background read loop that feeds `events` for as long
    /// as the connection lives; registration (and thus the IRC `welcome`)
    /// has already completed by the time this returns, so the caller
    /// joins its own channel synchronously right after.
    pub async fn connect(
        relays: &[(String, u16)],
        nick: &str,
        events: EventTx<ReactorEvent>,
    ) -> Result<(Arc<SignalingClient>, String)> {
        let mut shuffled = relays.to_vec();
        shuffled.shuffle(&mut thread_rng());

        let mut last_err = None;
        for (host, port) in shuffled {
            match Self::try_relay(&host, port, nick, events.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| Error::wrapped(ErrorKind::Signaling, "no relay nodes supplied")))
    }

    async fn try_relay(
        host: &str,
        port: u16,
        nick: &str,
        events: EventTx<ReactorEvent>,
    ) -> Result<(Arc<SignalingClient>, String)> {
        let stream = tokio::time::timeout(PER_RELAY_CONNECT_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::wrapped(ErrorKind::Signaling, format!("connect to {}:{} timed out", host, port)))?
            .wrapped(ErrorKind::Signaling)?;
        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, LinesCodec::new());
        let mut writer = FramedWrite::new(write_half, LinesCodec::new());

        let registered_nick = Self::register(&mut writer, &mut reader, nick).await?;

        let connected = Arc::new(AtomicBool::new(true));
        let writer = Arc::new(AsyncMutex::new(writer));

        tokio::spawn(Self::read_loop(reader, events, connected.clone()));

        Ok((
            Arc::new(SignalingClient { writer, connected }),
            registered_nick,
        ))
    }

    /// Drives `NICK`/`USER` registration, retrying under a fresh random
    /// nick on `433 nicknameinuse` up to `MAX_NICK_ATTEMPTS` times.
    async fn register(writer: &mut Writer, reader: &mut Reader, nick: &str) -> Result<String> {
        let mut current = nick.to_owned();
        for _ in 0..MAX_NICK_ATTEMPTS {
            writer
                .send(format!("NICK {}", current))
                .await
                .wrapped(ErrorKind::Signaling)?;
            writer
                .send(format!("USER {} 0 * :signode", current))
                .await
                .wrapped(ErrorKind::Signaling)?;

            loop {
                let line = reader
                    .next()
                    .await
                    .ok_or_else(|| {
                        Error::wrapped(ErrorKind::Signaling, "relay closed the connection during registration")
                    })?
                    .wrapped(ErrorKind::Signaling)?;

                let Some(parsed) = parse_line(&line) else {
                    continue;
                };
                match parsed.command.as_str() {
                    "001" => return Ok(current),
                    "433" => {
                        current = random_nick();
                        break;
                    }
                    "PING" => {
                        let token = parsed.params.first().cloned().unwrap_or_default();
                        writer
                            .send(format!("PONG :{}", token))
                            .await
                            .wrapped(ErrorKind::Signaling)?;
                    }
                    _ => {}
                }
            }
        }
        Err(Error::wrapped(ErrorKind::Signaling, "exhausted nicknameinuse retries"))
    }

    async fn read_loop(mut reader: Reader, events: EventTx<ReactorEvent>, connected: Arc<AtomicBool>) {
        while let Some(line) = reader.next().await {
            let Ok(line) = line else { break };
            let Some(parsed) = parse_line(&line) else {
                continue;
            };

            match parsed.command.as_str() {
                "PRIVMSG" => {
                    let Some(target) = parsed.params.first() else {
                        continue;
                    };
                    let Some(text) = parsed.params.get(1) else {
                        continue;
                    };
                    let source_nick = parsed
                        .prefix
                        .as_deref()
                        .map(nick_from_prefix)
                        .unwrap_or_default()
                        .to_owned();

                    if let Some((synack_b64, ip, port)) = parse_ctcp_dcc_chat(text) {
                        let event = ReactorEvent::DccCtcp {
                            source_nick,
                            synack_b64,
                            peer_ip: ip.to_string(),
                            peer_port: port,
                        };
                        if events.send(event).await.is_err() {
                            break;
                        }
                    } else if !text.starts_with('\u{1}') {
                        let event = ReactorEvent::Pubmsg {
                            target: target.clone(),
                            source_nick,
                            payload_b64: text.clone(),
                        };
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                "433" => {
                    if events.send(ReactorEvent::NicknameInUse).await.is_err() {
                        break;
                    }
                }
                _ => {}
            }
        }

        connected.store(false, Ordering::SeqCst);
        let _ = events.send(ReactorEvent::IrcDisconnect).await;
    }

    pub async fn join(&self, channel: &str) -> Result<()> {
        let mut w = self.writer.lock().await;
        w.send(format!("JOIN {}", channel))
            .await
            .wrapped(ErrorKind::Signaling)
    }

    pub async fn part(&self, channel: &str) -> Result<()> {
        let mut w = self.writer.lock().await;
        w.send(format!("PART {}", channel))
            .await
            .wrapped(ErrorKind::Signaling)
    }

    /// Sends a PUBMSG carrying `payload_b64` verbatim as the trailing
    /// parameter — the packet is already base64, the wire encoding spec
    /// calls for.
    pub async fn privmsg(&self, target: &str, payload_b64: &str) -> Result<()> {
        let mut w = self.writer.lock().await;
        w.send(format!("PRIVMSG {} :{}", target, payload_b64))
            .await
            .wrapped(ErrorKind::Signaling)
    }

    /// Sends a SYNACK as a CTCP `DCC CHAT` to `target_nick`.
    pub async fn ctcp_dcc_chat(
        &self,
        target_nick: &str,
        synack_b64: &str,
        ip: Ipv4Addr,
        port: u16,
    ) -> Result<()> {
        let body = format!("CHAT {} {} {}", synack_b64, encode_numeric_ip(ip), port);
        let ctcp = wrap_ctcp("DCC", &body);
        let mut w = self.writer.lock().await;
        w.send(format!("PRIVMSG {} :{}", target_nick, ctcp))
            .await
            .wrapped(ErrorKind::Signaling)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let mut w = self.writer.lock().await;
        let _ = w.send("QUIT :bye".to_owned()).await;
        let _ = w.close().await;
    }
}

/// Upper bound on how long relay selection may take before a connect
/// attempt gives up per-host, so a single unreachable relay in the list
/// cannot stall `connect` indefinitely (spec §5: "`connect` bounded by
/// relay-list length × per-server connect timeout").
pub const PER_RELAY_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
