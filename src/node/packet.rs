//! The signed, timestamped wire packet format (component C1).
//!
//! Four packet kinds are built and parsed here: `SYN`, `SYNACK`, `ACK` and
//! `DATA`. Every packet is individually signed and timestamped so
//! signaling messages can be relayed through an untrusted IRC network
//! without allowing forgery or replay. The sender's address is *never*
//! taken from a field on the wire — `parse` recovers it from the
//! signature (see `crypto::signature::recover_address`), so a forged
//! `node` field is not even representable.

use std::convert::TryInto;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest as _, Sha256};

use crate::crypto::signature::{self, KeyPair, Signature, SIGNATURE_LENGTH};
use crate::error::*;
use crate::node::address::NodeAddress;

/// Single-write chunk ceiling for a `DATA` packet's payload.
///
/// Chosen so a packed packet (header + payload + signature) fits
/// comfortably inside one DCC write, well under the common OS socket
/// buffer size, so the transport can guarantee the chunk arrives as one
/// atomic unit as seen by `parse`.
pub const MAX_DATA_SIZE: usize = 4096;

const TYPE_BYTE_LEN: usize = 1;
const TIMESTAMP_LEN: usize = 8;
const TESTNET_FLAG_LEN: usize = 1;
const PAYLOAD_LEN_LEN: usize = 4;
const FIXED_HEADER_LEN: usize = TYPE_BYTE_LEN + TIMESTAMP_LEN + TESTNET_FLAG_LEN + PAYLOAD_LEN_LEN;

/// The four control/data packet variants traded between peers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PacketKind {
    Syn,
    SynAck,
    Ack,
    Data,
}

impl PacketKind {
    fn to_byte(self) -> u8 {
        match self {
            PacketKind::Syn => 0,
            PacketKind::SynAck => 1,
            PacketKind::Ack => 2,
            PacketKind::Data => 3,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(PacketKind::Syn),
            1 => Some(PacketKind::SynAck),
            2 => Some(PacketKind::Ack),
            3 => Some(PacketKind::Data),
            _ => None,
        }
    }
}

/// A signed, timestamped control or data unit.
#[derive(Debug, Clone)]
pub struct Packet {
    kind: PacketKind,
    timestamp: u64,
    testnet: bool,
    /// Recovered from the signature on receipt; for locally-built
    /// packets this is simply our own address.
    node: NodeAddress,
    payload: Vec<u8>,
    signature: Signature,
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn node(&self) -> &NodeAddress {
        &self.node
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn build_syn(key: &KeyPair, testnet: bool) -> Packet {
        Self::build(key, PacketKind::Syn, &[], testnet)
    }

    pub fn build_synack(key: &KeyPair, testnet: bool) -> Packet {
        Self::build(key, PacketKind::SynAck, &[], testnet)
    }

    pub fn build_ack(key: &KeyPair, testnet: bool) -> Packet {
        Self::build(key, PacketKind::Ack, &[], testnet)
    }

    /// Builds a `DATA` packet carrying `chunk`. Fails if `chunk` exceeds
    /// `MAX_DATA_SIZE` — the caller (the sender loop) is responsible for
    /// pre-splitting larger buffers.
    pub fn build_data(key: &KeyPair, chunk: &[u8], testnet: bool) -> Result<Packet> {
        if chunk.len() > MAX_DATA_SIZE {
            return Err("chunk exceeds MAX_DATA_SIZE").simple(ErrorKind::Codec);
        }
        Ok(Self::build(key, PacketKind::Data, chunk, testnet))
    }

    fn build(key: &KeyPair, kind: PacketKind, payload: &[u8], testnet: bool) -> Packet {
        let timestamp = now_secs();
        let digest = signing_digest(kind, timestamp, testnet, payload);
        let signature = key.sign(&digest);
        Packet {
            kind,
            timestamp,
            testnet,
            node: key.address().clone(),
            payload: payload.to_vec(),
            signature,
        }
    }

    /// Serializes this packet into its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FIXED_HEADER_LEN + self.payload.len() + SIGNATURE_LENGTH);
        buf.push(self.kind.to_byte());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.push(self.testnet as u8);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.signature.to_bytes());
        buf
    }

    /// Parses and validates a packet off the wire.
    ///
    /// Returns `None` — never an `Err` — for any of: malformed encoding,
    /// signature mismatch, a stale timestamp, a mismatched testnet flag,
    /// or an unrecognized type byte. All are indistinguishable noise at
    /// this boundary; see spec's "Fail modes".
    pub fn parse(bytes: &[u8], expiretime: u64, testnet: bool) -> Option<Packet> {
        if bytes.len() < FIXED_HEADER_LEN + SIGNATURE_LENGTH {
            return None;
        }

        let kind = PacketKind::from_byte(bytes[0])?;

        let timestamp = u64::from_le_bytes(bytes[1..9].try_into().ok()?);

        let wire_testnet = bytes[9] != 0;
        if wire_testnet != testnet {
            return None;
        }

        let payload_len = u32::from_le_bytes(bytes[10..14].try_into().ok()?) as usize;
        let payload_start = FIXED_HEADER_LEN;
        let payload_end = payload_start.checked_add(payload_len)?;
        let sig_end = payload_end.checked_add(SIGNATURE_LENGTH)?;
        if bytes.len() != sig_end {
            return None;
        }
        if kind != PacketKind::Data && payload_len != 0 {
            return None;
        }
        if payload_len > MAX_DATA_SIZE {
            return None;
        }

        let payload = &bytes[payload_start..payload_end];
        let signature = Signature::from_bytes(&bytes[payload_end..sig_end]).ok()?;

        let now = now_secs();
        if now.saturating_sub(timestamp) > expiretime {
            return None;
        }

        let digest = signing_digest(kind, timestamp, testnet, payload);
        let node = signature::recover_address(&digest, &signature, testnet)?;

        Some(Packet {
            kind,
            timestamp,
            testnet,
            node,
            payload: payload.to_vec(),
            signature,
        })
    }
}

fn signing_digest(kind: PacketKind, timestamp: u64, testnet: bool, payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([kind.to_byte()]);
    hasher.update(timestamp.to_le_bytes());
    hasher.update([testnet as u8]);
    hasher.update(payload);
    hasher.finalize().into()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs()
}
