//! Single global receive queue (component C6, data half).
//!
//! Producer: the reactor, depositing each valid `DATA` packet's payload
//! as it arrives on any tunnel. Consumer: whoever calls
//! `Service::node_received`. The queue is a plain FIFO of
//! `(NodeAddress, bytes)` items; draining concatenates every sender's
//! items, in arrival order, into one buffer per sender.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::collections::HashMap;
use crate::node::address::NodeAddress;

pub struct Inbox {
    inner: Mutex<VecDeque<(NodeAddress, Vec<u8>)>>,
}

impl Inbox {
    pub fn new() -> Self {
        Inbox {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends one received chunk from `sender` to the queue.
    pub fn push(&self, sender: NodeAddress, bytes: Vec<u8>) {
        self.inner.lock().push_back((sender, bytes));
    }

    /// Drains the entire queue, concatenating each sender's chunks (in
    /// arrival order) into a single buffer. Idempotent on an empty
    /// inbox: always returns a fresh, possibly-empty mapping.
    pub fn drain(&self) -> HashMap<NodeAddress, Vec<u8>> {
        let mut queue = self.inner.lock();
        let mut result: HashMap<NodeAddress, Vec<u8>> = HashMap::default();
        for (sender, bytes) in queue.drain(..) {
            result.entry(sender).or_default().extend_from_slice(&bytes);
        }
        result
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signature::KeyPair;

    fn addr() -> NodeAddress {
        KeyPair::generate(false).address().clone()
    }

    #[test]
    fn drain_is_idempotent_on_empty_inbox() {
        let inbox = Inbox::new();
        assert!(inbox.drain().is_empty());
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn drain_concatenates_same_sender_in_arrival_order() {
        let inbox = Inbox::new();
        let a = addr();
        inbox.push(a.clone(), b"hel".to_vec());
        inbox.push(a.clone(), b"lo".to_vec());
        let drained = inbox.drain();
        assert_eq!(drained.get(&a).map(Vec::as_slice), Some(&b"hello"[..]));
    }

    #[test]
    fn drain_keeps_distinct_senders_separate() {
        let inbox = Inbox::new();
        let a = addr();
        let b = addr();
        inbox.push(a.clone(), b"alice".to_vec());
        inbox.push(b.clone(), b"bob".to_vec());
        let drained = inbox.drain();
        assert_eq!(drained.get(&a).map(Vec::as_slice), Some(&b"alice"[..]));
        assert_eq!(drained.get(&b).map(Vec::as_slice), Some(&b"bob"[..]));
    }
}
