//! The signaling and connection-lifecycle engine (components C1-C7).
//!
//! Submodules map directly onto the components of the design:
//! [`packet`] (C1), [`signaling`] (C2), [`tunnel`] (C3), [`peer`] (C4),
//! [`outbox`] (C5), [`reactor`]/[`inbox`] (C6), [`service`] (C7).
//! [`address`] and [`config`] are the data-model/constructor types the
//! rest hang off of; [`channel`] is the fan-in event channel the reactor
//! drains.

pub mod address;
pub mod channel;
pub mod config;
pub mod inbox;
pub mod outbox;
pub mod packet;
pub mod peer;
pub mod reactor;
pub mod service;
pub mod signaling;
pub mod tunnel;
