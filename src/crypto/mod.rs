//! Cryptographic primitives consumed by the signaling and tunnel layers.
//!
//! Only what the wire protocol actually needs is implemented here: WIF
//! decoding, address derivation, and signing/recovery. A full wallet
//! (coin selection, transaction construction, ...) is explicitly out of
//! scope; `signode` only ever consumes `sign`/`verify`/`address_from_pubkey`.

pub mod signature;
