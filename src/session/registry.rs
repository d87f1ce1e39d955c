//! Identifier → session map driven by inbound signaling

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::negotiator::SessionFactory;
use super::peer::{NegotiationState, PeerSession};
use crate::error::{AppError, Result};
use crate::signaling::{CommandDispatcher, IceCandidate, IncomingSink};

fn unknown_session(identifier: &str, method: &str) -> AppError {
    let err = AppError::UnknownSession(identifier.to_string());
    info!("Dropping '{}': {}", method, err);
    err
}

/// Owns every live peer session
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, PeerSession>>,
    factory: Arc<dyn SessionFactory>,
    messenger: Arc<CommandDispatcher>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn SessionFactory>, messenger: Arc<CommandDispatcher>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            factory,
            messenger,
        }
    }

    pub fn messenger(&self) -> &Arc<CommandDispatcher> {
        &self.messenger
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.sessions.lock().contains_key(identifier)
    }

    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn state(&self, identifier: &str) -> Option<NegotiationState> {
        self.sessions.lock().get(identifier).map(PeerSession::state)
    }

    /// Run `f` against a live session
    ///
    /// A missing session is logged and reported as `UnknownSession`.
    fn with_session<R>(
        &self,
        identifier: &str,
        method: &str,
        f: impl FnOnce(&mut PeerSession) -> R,
    ) -> Result<R> {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(identifier) {
            Some(session) => Ok(f(session)),
            None => Err(unknown_session(identifier, method)),
        }
    }

    fn take(&self, identifier: &str) -> Option<PeerSession> {
        self.sessions.lock().remove(identifier)
    }

    /// Close every session
    pub async fn shutdown(&self) {
        let drained: Vec<PeerSession> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        if drained.is_empty() {
            return;
        }

        info!("Closing {} session(s)", drained.len());
        for session in drained {
            session.close().await;
        }
    }
}

#[async_trait]
impl IncomingSink for SessionRegistry {
    async fn on_start(&self, source: &str) {
        if source.is_empty() {
            warn!("Ignoring start without a source identifier");
            return;
        }

        let previous = self.take(source);
        if let Some(previous) = previous {
            info!("Replacing existing session for {}", source);
            previous.close().await;
        }

        let session =
            match PeerSession::create(source, self.messenger.clone(), self.factory.as_ref()).await {
                Ok(session) => session,
                Err(e) => {
                    warn!("Failed to create session for {}: {}", source, e);
                    return;
                }
            };

        session.offer();
        self.sessions.lock().insert(source.to_string(), session);
        info!("Session started for {}", source);
    }

    async fn on_close(&self, source: &str) {
        let session = self.take(source);
        match session {
            Some(session) => session.close().await,
            None => {
                unknown_session(source, "close");
            }
        }
    }

    async fn on_answer(&self, source: &str, sdp: &str) {
        let _ = self.with_session(source, "answer", |session| session.accept_answer(sdp));
    }

    async fn on_candidates(&self, source: &str, candidates: Vec<IceCandidate>) {
        debug!("{} remote candidate(s) from {}", candidates.len(), source);
        let _ = self.with_session(source, "candidate", |session| {
            session.receive_ice_candidates(candidates)
        });
    }

    async fn on_acquire(&self, source: &str) {
        let result = self.with_session(source, "acquire", PeerSession::acquire);
        if let Ok(Err(e)) = result {
            warn!("Acquire for {} failed: {}", source, e);
        }
    }
}
