//! The single fan-in channel the reactor loop drains.
//!
//! Every event producer — the IRC signaling client, and each spawned
//! per-tunnel read task — holds a clone of the same `EventTx` and pushes
//! into it directly; `ReactorLoop` is the sole consumer. This is the
//! idiomatic-async-Rust shape of the "single event pump" the design
//! calls for: producers never share a lock with the consumer, they only
//! share a channel.

use tokio::sync::mpsc;

pub type EventTx<T> = mpsc::Sender<T>;
pub type EventRx<T> = mpsc::Receiver<T>;

/// Bound chosen generously above the expected number of in-flight
/// handshakes/tunnel reads for a single `Service`; a full channel would
/// make a producer task wait rather than drop an event.
pub const CHAN_BOUND: usize = 256;

pub fn new_event_channel<T>() -> (EventTx<T>, EventRx<T>) {
    mpsc::channel(CHAN_BOUND)
}
