//! `ServiceConfig`: the constructor-time parameters of a `Service`,
//! mirroring the teacher's `NodeConfig` companion to `Node`.

use std::net::IpAddr;

use crate::crypto::signature::KeyPair;
use crate::error::*;

/// Default packet expiry window, in seconds (spec §3: "default 20 s").
pub const DEFAULT_EXPIRETIME: u64 = 20;

/// Constructor parameters for a [`crate::node::service::Service`].
///
/// `relaynodes` is never mutated in place; `Service::connect` copies it
/// before shuffling, so the caller's original ordering is preserved
/// across repeated `reconnect` calls.
pub struct ServiceConfig {
    pub relaynodes: Vec<(String, u16)>,
    pub key: KeyPair,
    pub testnet: bool,
    pub expiretime: u64,
    /// Local interface DCC listeners bind to. `0.0.0.0` unless the
    /// caller needs to pin a specific address (e.g. in tests, where
    /// `127.0.0.1` keeps everything off the real network).
    pub bind_ip: IpAddr,
}

impl ServiceConfig {
    /// Builds a config from a WIF-encoded private key, matching spec's
    /// `Service(initial_relaynodes, wif, testnet=False, expiretime=20)`
    /// constructor signature.
    pub fn from_wif(relaynodes: Vec<(String, u16)>, wif: &str, testnet: bool) -> Result<Self> {
        if relaynodes.is_empty() {
            return Err("relaynodes must be non-empty").simple(ErrorKind::Precondition);
        }
        let key = KeyPair::from_wif(wif, testnet)?;
        Ok(ServiceConfig {
            relaynodes,
            key,
            testnet,
            expiretime: DEFAULT_EXPIRETIME,
            bind_ip: "0.0.0.0".parse().unwrap(),
        })
    }

    pub fn with_expiretime(mut self, expiretime: u64) -> Self {
        self.expiretime = expiretime;
        self
    }

    pub fn with_bind_ip(mut self, bind_ip: IpAddr) -> Self {
        self.bind_ip = bind_ip;
        self
    }
}
