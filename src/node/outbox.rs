//! Per-address send queue (component C5, data half).
//!
//! An entry is created lazily on the first `node_send` for a peer and
//! persists for the service's lifetime, even once drained empty — this
//! mirrors spec's explicit requirement that a caller sending to the same
//! address repeatedly never pays for map churn.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::collections::HashMap;
use crate::node::address::NodeAddress;

pub struct OutboxMap {
    inner: Mutex<HashMap<NodeAddress, VecDeque<Vec<u8>>>>,
}

impl OutboxMap {
    pub fn new() -> Self {
        OutboxMap {
            inner: Mutex::new(HashMap::default()),
        }
    }

    /// Enqueues `bytes` for `addr`, creating the queue if necessary.
    pub fn enqueue(&self, addr: NodeAddress, bytes: Vec<u8>) {
        self.inner.lock().entry(addr).or_default().push_back(bytes);
    }

    /// Snapshot of every address that has ever had a queue created,
    /// taken without holding the lock while the sender loop processes
    /// each one (spec §9: "never hold the IRC lock across a full outbox
    /// pass").
    pub fn known_addresses(&self) -> Vec<NodeAddress> {
        self.inner.lock().keys().cloned().collect()
    }

    /// Drains every buffer currently queued for `addr`, in FIFO order,
    /// leaving an empty queue behind (the entry itself is not removed).
    pub fn drain_all(&self, addr: &NodeAddress) -> Vec<Vec<u8>> {
        match self.inner.lock().get_mut(addr) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Pushes `bytes` back onto the front of `addr`'s queue — used to
    /// requeue a chunk a dead tunnel failed to accept, so it is retried
    /// once the peer reconnects rather than silently lost.
    pub fn requeue_front(&self, addr: &NodeAddress, bytes: Vec<u8>) {
        self.inner.lock().entry(addr.clone()).or_default().push_front(bytes);
    }
}

impl Default for OutboxMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Concatenates `buffers` into one contiguous byte string, then splits
/// it into chunks of at most `chunk_size` bytes. Used by the sender loop
/// to implement spec's "drain, concatenate, then rechunk" dispatch rule.
pub fn coalesce_and_chunk(buffers: Vec<Vec<u8>>, chunk_size: usize) -> Vec<Vec<u8>> {
    if buffers.is_empty() {
        return Vec::new();
    }
    let total: usize = buffers.iter().map(Vec::len).sum();
    let mut joined = Vec::with_capacity(total);
    for buf in buffers {
        joined.extend_from_slice(&buf);
    }
    if joined.is_empty() {
        return Vec::new();
    }
    joined
        .chunks(chunk_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}
