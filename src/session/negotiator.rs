//! Collaborator seams used by peer sessions
//!
//! The negotiation backend (offer/answer/candidates) and the render instance
//! are created together by a [`SessionFactory`] for each peer.

use std::sync::Arc;

use async_trait::async_trait;

use super::peer::PeerEvents;
use crate::error::Result;
use crate::input::InputReceiver;
use crate::render::RenderInstance;
use crate::signaling::IceCandidate;

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

impl std::fmt::Display for SdpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpKind::Offer => write!(f, "offer"),
            SdpKind::Answer => write!(f, "answer"),
        }
    }
}

/// Offer/answer/candidate primitives of one peer connection
///
/// Description and candidate text that fails to parse is reported as
/// [`AppError::NegotiationParse`](crate::error::AppError::NegotiationParse).
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Create an offer that requests inbound media; returns its SDP text
    async fn create_offer(&self) -> Result<String>;

    async fn set_local_description(&self, kind: SdpKind, sdp: String) -> Result<()>;

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Release the connection; later calls fail
    async fn close(&self);
}

/// Collaborators bound to one session
pub struct PeerBinding {
    pub negotiator: Arc<dyn Negotiator>,
    pub render: Box<dyn RenderInstance>,
}

/// Creates the collaborators for a new peer
///
/// `events` must be used for every asynchronous notification the backend
/// produces (gathered candidates, data-channel text); `input` is the
/// consumer end of the session's control queue and belongs to the render
/// instance.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(
        &self,
        identifier: &str,
        events: PeerEvents,
        input: InputReceiver,
    ) -> Result<PeerBinding>;
}
