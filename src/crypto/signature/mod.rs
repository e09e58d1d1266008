//! Bitcoin-style signing primitives: WIF-encoded secp256k1 keys, and
//! recoverable ECDSA signatures.
//!
//! The recoverable signature scheme is the load-bearing choice here: a
//! `Packet`'s claimed sender is never taken from a field on the wire, it
//! is recovered from the signature itself (see `recover_address`), the
//! same way Bitcoin's `signmessage`/`verifymessage` pair works.

use ripemd::Ripemd160;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::rand::rngs::OsRng;
use secp256k1::{Message, PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use sha2::{Digest as _, Sha256};

use crate::error::*;
use crate::node::address::{NodeAddress, VERSION_MAINNET, VERSION_TESTNET};

/// Length, in bytes, of a compact recoverable ECDSA signature
/// (32 bytes `r` + 32 bytes `s` + 1 byte recovery id).
pub const SIGNATURE_LENGTH: usize = 65;

/// A recoverable ECDSA signature over a 32-byte message digest.
#[derive(Clone, Copy)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() != SIGNATURE_LENGTH {
            return Err("signature has an invalid length").simple(ErrorKind::Codec);
        }
        let mut buf = [0; SIGNATURE_LENGTH];
        buf.copy_from_slice(raw);
        Ok(Signature(buf))
    }

    fn to_recoverable(self) -> Result<RecoverableSignature> {
        let recid = RecoveryId::from_i32(self.0[64] as i32)
            .simple(ErrorKind::Codec)?;
        RecoverableSignature::from_compact(&self.0[..64], recid)
            .simple(ErrorKind::Codec)
    }
}

/// A secp256k1 public key, serialized in compressed form.
#[derive(Clone, Eq, PartialEq)]
pub struct PublicKey(Secp256k1PublicKey);

impl PublicKey {
    pub fn serialize(&self) -> [u8; 33] {
        self.0.serialize()
    }
}

/// A private signing key plus its derived `NodeAddress`.
///
/// A `Service` owns exactly one `KeyPair` for its entire lifetime.
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
    address: NodeAddress,
}

impl KeyPair {
    /// Decodes a WIF-encoded private key and derives its public key and
    /// node address.
    pub fn from_wif(wif: &str, testnet: bool) -> Result<Self> {
        let expected_version = if testnet { 0xef } else { 0x80 };
        let decoded = bs58::decode(wif)
            .with_check(Some(expected_version))
            .into_vec()
            .simple(ErrorKind::Key)?;

        // payload: [version][32-byte secret][optional 0x01 compression flag]
        let body = &decoded[1..];
        let raw_secret = match body.len() {
            33 if body[32] == 0x01 => &body[..32],
            32 => body,
            _ => return Err("WIF payload has an unexpected length").simple(ErrorKind::Key),
        };

        let secret = SecretKey::from_slice(raw_secret).simple(ErrorKind::Key)?;
        Self::from_secret_key(secret, testnet)
    }

    /// Generates a fresh random key pair. Used by tests and the demo
    /// binary; never called on the hot path.
    pub fn generate(testnet: bool) -> Self {
        let secp = Secp256k1::signing_only();
        let (secret, _public) = secp.generate_keypair(&mut OsRng);
        Self::from_secret_key(secret, testnet).expect("freshly generated key is always valid")
    }

    fn from_secret_key(secret: SecretKey, testnet: bool) -> Result<Self> {
        let secp = Secp256k1::signing_only();
        let public = PublicKey(Secp256k1PublicKey::from_secret_key(&secp, &secret));
        let address = address_from_pubkey(&public, testnet);
        Ok(KeyPair {
            secret,
            public,
            address,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// Signs a 32-byte digest, producing a signature the verifier can
    /// recover our public key (and thus our address) from.
    pub fn sign(&self, digest: &[u8; 32]) -> Signature {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest(*digest);
        let recoverable = secp.sign_ecdsa_recoverable(&message, &self.secret);
        let (recid, compact) = recoverable.serialize_compact();
        let mut buf = [0; SIGNATURE_LENGTH];
        buf[..64].copy_from_slice(&compact);
        buf[64] = recid.to_i32() as u8;
        Signature(buf)
    }
}

/// Derives the Base58Check P2PKH-style address of a public key.
pub fn address_from_pubkey(pk: &PublicKey, testnet: bool) -> NodeAddress {
    let sha = Sha256::digest(pk.serialize());
    let hash160 = Ripemd160::digest(sha);
    let version = if testnet {
        VERSION_TESTNET
    } else {
        VERSION_MAINNET
    };
    let encoded = bs58::encode(hash160)
        .with_check_version(version)
        .into_string();
    NodeAddress::from_validated(encoded)
}

/// Recovers the address of whoever produced `signature` over `digest`.
///
/// Returns `None` if the signature is malformed in a way that prevents
/// recovery (never for a "bad" signature per se: recovery always yields
/// *some* public key satisfying the ECDSA equation for a syntactically
/// valid recoverable signature, which is precisely what makes this scheme
/// self-verifying).
pub fn recover_address(digest: &[u8; 32], signature: &Signature, testnet: bool) -> Option<NodeAddress> {
    let secp = Secp256k1::verification_only();
    let message = Message::from_digest(*digest);
    let recoverable = signature.to_recoverable().ok()?;
    let pubkey = secp.recover_ecdsa(&message, &recoverable).ok()?;
    Some(address_from_pubkey(&PublicKey(pubkey), testnet))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_recover_yields_signer_address() {
        let key = KeyPair::generate(false);
        let digest = Sha256::digest(b"hello signode").into();
        let sig = key.sign(&digest);
        let recovered = recover_address(&digest, &sig, false).expect("recovers");
        assert_eq!(&recovered, key.address());
    }

    #[test]
    fn recover_with_wrong_testnet_flag_yields_different_address() {
        let key = KeyPair::generate(false);
        let digest = Sha256::digest(b"hello signode").into();
        let sig = key.sign(&digest);
        let recovered = recover_address(&digest, &sig, true).expect("recovers");
        assert_ne!(&recovered, key.address());
    }

    #[test]
    fn tampered_digest_recovers_a_different_address() {
        let key = KeyPair::generate(false);
        let digest = Sha256::digest(b"hello signode").into();
        let sig = key.sign(&digest);
        let tampered = Sha256::digest(b"hello sig-node").into();
        let recovered = recover_address(&tampered, &sig, false).expect("recovers");
        assert_ne!(&recovered, key.address());
    }
}
