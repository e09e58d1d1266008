//! A minimal loopback IRC relay, test-double for the real signaling
//! plane the library talks to in production.
//!
//! Implements just enough of RFC 1459 to drive a `signode::Service`
//! through registration and channel relay: `NICK`/`USER` (replying `001`
//! once both have been seen, or `433` on a nick collision), `PING`/`PONG`,
//! `JOIN`/`PART`, and `PRIVMSG` forwarding to either a channel's members
//! or a single nick. Nothing else is implemented; unrecognized commands
//! are silently dropped, mirroring how a real relay ignores commands a
//! client doesn't send.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

struct ClientHandle {
    tx: mpsc::UnboundedSender<String>,
    channels: HashSet<String>,
}

type Registry = Arc<Mutex<HashMap<String, ClientHandle>>>;

/// Spawns a fake relay on an OS-assigned loopback port and returns its
/// address. The relay runs until the test process exits; there is no
/// shutdown handle because no test needs one.
pub async fn spawn_fake_relay() -> SocketAddr {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind fake relay");
    let addr = listener.local_addr().expect("local_addr");
    let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
    tokio::spawn(accept_loop(listener, registry));
    addr
}

/// Spawns a relay that refuses every connection attempt immediately, by
/// binding then dropping the listener without ever accepting — used to
/// exercise relay-exhaustion (nothing is actually listening on the
/// returned port once this returns).
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind throwaway listener");
    let addr = listener.local_addr().expect("local_addr");
    drop(listener);
    addr
}

async fn accept_loop(listener: TcpListener, registry: Registry) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(handle_client(stream, registry.clone()));
    }
}

async fn handle_client(stream: TcpStream, registry: Registry) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, LinesCodec::new());
    let writer = FramedWrite::new(write_half, LinesCodec::new());

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(line) = rx.recv().await {
            if writer.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut nick = String::new();
    let mut got_user = false;

    while let Some(Ok(line)) = reader.next().await {
        let Some((command, params)) = split_line(&line) else {
            continue;
        };

        match command.as_str() {
            "NICK" => {
                let requested = params.first().cloned().unwrap_or_default();
                let mut guard = registry.lock().await;
                if guard.contains_key(&requested) {
                    let _ = tx.send(format!(":relay 433 * {} :Nickname is already in use", requested));
                } else {
                    if !nick.is_empty() {
                        guard.remove(&nick);
                    }
                    nick = requested.clone();
                    guard.insert(
                        nick.clone(),
                        ClientHandle {
                            tx: tx.clone(),
                            channels: HashSet::new(),
                        },
                    );
                    drop(guard);
                    if got_user {
                        let _ = tx.send(format!(":relay 001 {} :welcome", nick));
                    }
                }
            }
            "USER" => {
                got_user = true;
                if !nick.is_empty() {
                    let _ = tx.send(format!(":relay 001 {} :welcome", nick));
                }
            }
            "PING" => {
                let token = params.first().cloned().unwrap_or_default();
                let _ = tx.send(format!("PONG :{}", token));
            }
            "JOIN" => {
                if let Some(channel) = params.first() {
                    if let Some(handle) = registry.lock().await.get_mut(&nick) {
                        handle.channels.insert(channel.clone());
                    }
                }
            }
            "PART" => {
                if let Some(channel) = params.first() {
                    if let Some(handle) = registry.lock().await.get_mut(&nick) {
                        handle.channels.remove(channel);
                    }
                }
            }
            "PRIVMSG" => {
                let Some(target) = params.first() else { continue };
                let Some(text) = params.get(1) else { continue };
                let line = format!(":{}!u@h PRIVMSG {} :{}", nick, target, text);
                let guard = registry.lock().await;
                if let Some(channel) = target.strip_prefix('#') {
                    let channel = format!("#{}", channel);
                    for (other_nick, handle) in guard.iter() {
                        if other_nick != &nick && handle.channels.contains(&channel) {
                            let _ = handle.tx.send(line.clone());
                        }
                    }
                } else if let Some(handle) = guard.get(target.as_str()) {
                    let _ = handle.tx.send(line);
                }
            }
            "QUIT" => break,
            _ => {}
        }
    }

    registry.lock().await.remove(&nick);
    writer_task.abort();
}

/// Splits one IRC protocol line into its command and parameters,
/// ignoring any leading `:prefix`.
fn split_line(line: &str) -> Option<(String, Vec<String>)> {
    let mut rest = line;
    if let Some(stripped) = rest.strip_prefix(':') {
        let (_, r) = stripped.split_once(' ')?;
        rest = r;
    }
    let (head, trailing) = match rest.split_once(" :") {
        Some((h, t)) => (h, Some(t)),
        None => (rest, None),
    };
    let mut parts = head.split(' ').filter(|s| !s.is_empty());
    let command = parts.next()?.to_owned();
    let mut params: Vec<String> = parts.map(str::to_owned).collect();
    if let Some(t) = trailing {
        params.push(t.to_owned());
    }
    Some((command, params))
}
