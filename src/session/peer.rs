//! Per-peer negotiation state machine
//!
//! ```text
//! Idle --offer()--> Offering --answer accepted--> Negotiated
//! ```
//!
//! Locally gathered ICE candidates are held back until the peer's answer has
//! been applied, then flushed as one batch; candidates gathered after that
//! point go out one by one. The state, the flush flag and the candidate
//! buffer sit behind one lock, and the flush is emitted while holding it,
//! so the batch always reaches the transport before any later single.
//!
//! Offer creation, answer application and remote candidates run on one
//! worker task per session, in the order they were requested, so a candidate
//! never reaches the backend ahead of the answer that preceded it.
//!
//! Backend callbacks enter through [`PeerEvents`], which holds only a weak
//! reference and checks liveness first: once [`PeerSession::close`] has begun,
//! late callbacks are dropped.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::negotiator::{Negotiator, PeerBinding, SdpKind, SessionFactory};
use crate::error::{AppError, Result};
use crate::input::{apply_command, input_bridge, InputSender};
use crate::render::RenderInstance;
use crate::signaling::{CommandDispatcher, IceCandidate};

/// Negotiation progress of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    Offering,
    Negotiated,
}

impl std::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NegotiationState::Idle => write!(f, "idle"),
            NegotiationState::Offering => write!(f, "offering"),
            NegotiationState::Negotiated => write!(f, "negotiated"),
        }
    }
}

/// Guarded as one unit
struct Negotiation {
    state: NegotiationState,
    ice_buffering: bool,
    buffered: Vec<IceCandidate>,
    alive: bool,
}

/// Session state reachable from backend callbacks
struct PeerShared {
    identifier: String,
    messenger: Arc<CommandDispatcher>,
    input: InputSender,
    negotiation: Mutex<Negotiation>,
}

impl PeerShared {
    fn on_offer_ready(&self, sdp: &str) {
        let n = self.negotiation.lock();
        if !n.alive {
            debug!("Offer for {} ready after teardown, dropping", self.identifier);
            return;
        }
        info!("Sending offer to {}", self.identifier);
        self.messenger.send_offer(&self.identifier, sdp);
    }

    fn on_offer_failed(&self, error: &AppError) {
        let mut n = self.negotiation.lock();
        warn!("Offer for {} failed: {}", self.identifier, error);
        if n.alive && n.state == NegotiationState::Offering {
            n.state = NegotiationState::Idle;
        }
    }

    fn on_remote_description_set(&self, kind: SdpKind) {
        if kind != SdpKind::Answer {
            return;
        }

        let mut n = self.negotiation.lock();
        if !n.alive {
            debug!("Answer for {} applied after teardown, dropping", self.identifier);
            return;
        }

        n.ice_buffering = false;
        n.state = NegotiationState::Negotiated;
        let batch = std::mem::take(&mut n.buffered);

        info!(
            "Answer accepted for {}, flushing {} candidate(s)",
            self.identifier,
            batch.len()
        );
        if !batch.is_empty() {
            self.messenger.send_ice_candidates(&self.identifier, &batch);
        }
    }

    fn on_ice_candidate(&self, candidate: IceCandidate) {
        let mut n = self.negotiation.lock();
        if !n.alive {
            debug!("Candidate for {} gathered after teardown, dropping", self.identifier);
            return;
        }

        n.buffered.push(candidate);
        if !n.ice_buffering {
            debug!("Sending late candidate to {}", self.identifier);
            let single = std::mem::take(&mut n.buffered);
            self.messenger.send_ice_candidates(&self.identifier, &single);
        }
    }

    fn is_alive(&self) -> bool {
        self.negotiation.lock().alive
    }
}

/// Backend-facing callback handle for one session
///
/// Cheap to clone; never keeps the session alive.
#[derive(Clone)]
pub struct PeerEvents {
    shared: Weak<PeerShared>,
}

impl PeerEvents {
    fn live(&self) -> Option<Arc<PeerShared>> {
        self.shared.upgrade().filter(|shared| shared.is_alive())
    }

    /// A local ICE candidate was gathered
    pub fn ice_candidate_gathered(&self, candidate: IceCandidate) {
        match self.shared.upgrade() {
            Some(shared) => shared.on_ice_candidate(candidate),
            None => debug!("Candidate gathered for a released session, dropping"),
        }
    }

    /// A text message arrived on the control data channel
    pub fn control_message(&self, text: &str) {
        match self.live() {
            Some(shared) => {
                apply_command(text, &shared.input);
            }
            None => debug!("Control message for a released session, dropping"),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.live().is_some()
    }

    /// Handle bound to no session
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self { shared: Weak::new() }
    }
}

/// Negotiator work queued by a session
enum NegotiationOp {
    Offer,
    Answer(String),
    RemoteCandidates(Vec<IceCandidate>),
}

/// Run one session's negotiator operations strictly in arrival order
///
/// Ends when the session drops its sender. Operations still queued once the
/// session is released are discarded.
async fn run_negotiation(
    identifier: String,
    shared: Weak<PeerShared>,
    negotiator: Arc<dyn Negotiator>,
    mut queue: mpsc::UnboundedReceiver<NegotiationOp>,
) {
    while let Some(op) = queue.recv().await {
        if !shared.upgrade().is_some_and(|s| s.is_alive()) {
            debug!("Session {} released, discarding queued operations", identifier);
            break;
        }

        match op {
            NegotiationOp::Offer => send_offer(&shared, negotiator.as_ref()).await,
            NegotiationOp::Answer(sdp) => {
                apply_answer(&identifier, &shared, negotiator.as_ref(), sdp).await
            }
            NegotiationOp::RemoteCandidates(candidates) => {
                add_remote_candidates(&identifier, &shared, negotiator.as_ref(), candidates).await
            }
        }
    }
    debug!("Negotiation worker for {} stopped", identifier);
}

async fn send_offer(shared: &Weak<PeerShared>, negotiator: &dyn Negotiator) {
    let offer = negotiator.create_offer().await;

    let Some(session) = shared.upgrade().filter(|s| s.is_alive()) else {
        debug!("Offer created for a released session, dropping");
        return;
    };
    let sdp = match offer {
        Ok(sdp) => sdp,
        Err(e) => return session.on_offer_failed(&e),
    };
    drop(session);

    let applied = negotiator
        .set_local_description(SdpKind::Offer, sdp.clone())
        .await;

    let Some(session) = shared.upgrade() else {
        debug!("Local offer applied for a released session, dropping");
        return;
    };
    match applied {
        Ok(()) => session.on_offer_ready(&sdp),
        Err(e) => session.on_offer_failed(&e),
    }
}

async fn apply_answer(
    identifier: &str,
    shared: &Weak<PeerShared>,
    negotiator: &dyn Negotiator,
    sdp: String,
) {
    let result = negotiator.set_remote_description(SdpKind::Answer, sdp).await;

    let Some(session) = shared.upgrade() else {
        debug!("Answer for {} applied after release, dropping", identifier);
        return;
    };
    match result {
        Ok(()) => session.on_remote_description_set(SdpKind::Answer),
        Err(e @ AppError::NegotiationParse(_)) => {
            warn!("Answer from {} rejected, peer must resend: {}", identifier, e)
        }
        Err(e) => warn!("Failed to apply answer from {}: {}", identifier, e),
    }
}

async fn add_remote_candidates(
    identifier: &str,
    shared: &Weak<PeerShared>,
    negotiator: &dyn Negotiator,
    candidates: Vec<IceCandidate>,
) {
    for candidate in candidates {
        if !shared.upgrade().is_some_and(|s| s.is_alive()) {
            debug!("Session {} released, dropping remaining candidates", identifier);
            return;
        }
        if let Err(e) = negotiator.add_remote_candidate(candidate).await {
            warn!("Skipping candidate from {}: {}", identifier, e);
        }
    }
}

/// One peer's signaling session
pub struct PeerSession {
    shared: Arc<PeerShared>,
    negotiator: Arc<dyn Negotiator>,
    ops: mpsc::UnboundedSender<NegotiationOp>,
    render: Option<Box<dyn RenderInstance>>,
}

impl PeerSession {
    /// Create a session and its collaborators
    pub async fn create(
        identifier: &str,
        messenger: Arc<CommandDispatcher>,
        factory: &dyn SessionFactory,
    ) -> Result<Self> {
        let (input, receiver) = input_bridge();
        let shared = Arc::new(PeerShared {
            identifier: identifier.to_string(),
            messenger,
            input,
            negotiation: Mutex::new(Negotiation {
                state: NegotiationState::Idle,
                ice_buffering: true,
                buffered: Vec::new(),
                alive: true,
            }),
        });

        let events = PeerEvents {
            shared: Arc::downgrade(&shared),
        };
        let PeerBinding { negotiator, render } =
            factory.create(identifier, events, receiver).await?;

        let (ops, queue) = mpsc::unbounded_channel();
        tokio::spawn(run_negotiation(
            identifier.to_string(),
            Arc::downgrade(&shared),
            negotiator.clone(),
            queue,
        ));

        debug!("Session {} created", identifier);

        Ok(Self {
            shared,
            negotiator,
            ops,
            render: Some(render),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.shared.identifier
    }

    pub fn state(&self) -> NegotiationState {
        self.shared.negotiation.lock().state
    }

    pub fn is_ice_buffering(&self) -> bool {
        self.shared.negotiation.lock().ice_buffering
    }

    /// Candidates held back awaiting the answer
    pub fn buffered_candidates(&self) -> usize {
        self.shared.negotiation.lock().buffered.len()
    }

    /// Callback handle for this session
    pub fn events(&self) -> PeerEvents {
        PeerEvents {
            shared: Arc::downgrade(&self.shared),
        }
    }

    fn enqueue(&self, op: NegotiationOp) {
        if self.ops.send(op).is_err() {
            debug!("Negotiation worker for {} gone, dropping operation", self.shared.identifier);
        }
    }

    /// Create an offer, apply it locally, then send it to the peer
    pub fn offer(&self) {
        {
            let mut n = self.shared.negotiation.lock();
            if n.state != NegotiationState::Idle {
                warn!(
                    "Offer requested for {} in state {}, ignoring",
                    self.shared.identifier, n.state
                );
                return;
            }
            n.state = NegotiationState::Offering;
        }

        self.enqueue(NegotiationOp::Offer);
    }

    /// Apply the peer's SDP answer
    ///
    /// Parse failures leave the state untouched; the peer has to resend.
    pub fn accept_answer(&self, sdp: &str) {
        {
            let n = self.shared.negotiation.lock();
            if n.state != NegotiationState::Offering {
                warn!(
                    "Answer from {} in state {}, ignoring",
                    self.shared.identifier, n.state
                );
                return;
            }
        }

        self.enqueue(NegotiationOp::Answer(sdp.to_string()));
    }

    /// Hand the peer's candidates to the backend, skipping any it rejects
    ///
    /// Applied after any answer received before them.
    pub fn receive_ice_candidates(&self, candidates: Vec<IceCandidate>) {
        if candidates.is_empty() {
            return;
        }

        self.enqueue(NegotiationOp::RemoteCandidates(candidates));
    }

    /// Start the bound render instance; no-op while it is running
    pub fn acquire(&mut self) -> Result<()> {
        let Some(render) = self.render.as_mut() else {
            return Err(AppError::Render(format!(
                "session {} has no render instance",
                self.shared.identifier
            )));
        };

        if render.is_running() {
            debug!("Render for {} already running", self.shared.identifier);
            return Ok(());
        }

        render.start()?;
        info!("Render acquired by {}", self.shared.identifier);
        Ok(())
    }

    pub fn is_rendering(&self) -> bool {
        self.render.as_ref().is_some_and(|r| r.is_running())
    }

    fn mark_released(&self) {
        let mut n = self.shared.negotiation.lock();
        n.alive = false;
        n.buffered.clear();
    }

    /// Tear the session down
    ///
    /// The render thread is stopped and joined before the negotiator is
    /// released, so no frame can be delivered into a closed connection.
    pub async fn close(mut self) {
        self.mark_released();

        if let Some(mut render) = self.render.take() {
            if let Err(e) = tokio::task::spawn_blocking(move || render.stop()).await {
                warn!("Render stop for {} failed: {}", self.shared.identifier, e);
            }
        }

        self.negotiator.close().await;
        info!("Session {} closed", self.shared.identifier);
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        let Some(mut render) = self.render.take() else {
            return;
        };
        self.mark_released();
        debug!("Session {} dropped without close", self.shared.identifier);

        // Joining the render thread must not stall a runtime worker
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || render.stop());
            }
            Err(_) => render.stop(),
        }
    }
}
