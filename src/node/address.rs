//! `NodeAddress`: a printable identifier derived from a public key,
//! encoded the way a Bitcoin P2PKH address is (version byte + RIPEMD160
//! of SHA256 of the public key + a Base58Check trailer).
//!
//! A `NodeAddress` is only ever *constructed* here or in
//! `crypto::signature::address_from_pubkey` — the rest of the crate
//! treats it as an opaque, already-validated string.

use std::fmt;

use crate::error::*;

/// Version byte of a mainnet P2PKH-style address.
pub const VERSION_MAINNET: u8 = 0x00;
/// Version byte of a testnet P2PKH-style address.
pub const VERSION_TESTNET: u8 = 0x6f;

/// A printable, Base58Check-encoded node address.
///
/// Used both as a map key identifying a peer, and (with a `#` prefix) as
/// the name of the IRC channel that peer listens on for SYNs.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Wraps an already Base58Check-validated address string.
    pub(crate) fn from_validated(s: String) -> Self {
        NodeAddress(s)
    }

    /// Parses and validates a printable address.
    ///
    /// This is the boundary `Service::node_send` relies on to reject
    /// malformed addresses (see spec's "precondition violation").
    pub fn parse(s: &str) -> Result<Self> {
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .simple_msg(ErrorKind::Precondition, "invalid address encoding")?;
        match decoded.first() {
            Some(&VERSION_MAINNET) | Some(&VERSION_TESTNET) => {}
            _ => {
                return Err("address has an unrecognized version byte")
                    .simple(ErrorKind::Precondition);
            }
        }
        if decoded.len() != 21 {
            return Err("address payload has the wrong length")
                .simple(ErrorKind::Precondition);
        }
        Ok(NodeAddress(s.to_owned()))
    }

    /// Returns the address as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the IRC channel name a node with this address joins to
    /// receive inbound SYNs: `#<address>`.
    pub fn channel_name(&self) -> String {
        format!("#{}", self.0)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
