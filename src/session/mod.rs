//! Peer session lifecycle
//!
//! - [`PeerSession`]: offer/answer state machine and ICE candidate buffering
//! - [`SessionRegistry`]: routes inbound signaling to sessions by identifier
//! - [`Negotiator`] / [`SessionFactory`]: the negotiation backend seam

pub mod negotiator;
pub mod peer;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use negotiator::{Negotiator, PeerBinding, SdpKind, SessionFactory};
pub use peer::{NegotiationState, PeerEvents, PeerSession};
pub use registry::SessionRegistry;
