//! Method routing for decoded signaling envelopes
//!
//! The protocol is one-way: nothing here ever replies to the peer. Decode
//! failures, unknown methods and rejected parameters are logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, trace, warn};

use super::message::{
    decode_candidates, encode_candidates, Envelope, IceCandidate, METHOD_ACQUIRE, METHOD_ANSWER,
    METHOD_CANDIDATE, METHOD_CLOSE, METHOD_OFFER, METHOD_START,
};
use crate::error::{AppError, Result};

/// Receiver of routed inbound commands
#[async_trait]
pub trait IncomingSink: Send + Sync {
    async fn on_start(&self, source: &str);
    async fn on_close(&self, source: &str);
    async fn on_answer(&self, source: &str, sdp: &str);
    async fn on_candidates(&self, source: &str, candidates: Vec<IceCandidate>);
    async fn on_acquire(&self, source: &str);
}

/// Outbound half of the text transport
///
/// Must not block: implementations queue the text for a writer task.
pub trait OutboundTransport: Send + Sync {
    fn send_message(&self, message: String);
}

/// Handler shape: `(sink, source, parameter) -> accepted`
pub type Handler = for<'a> fn(&'a dyn IncomingSink, &'a str, &'a str) -> BoxFuture<'a, bool>;

fn handle_start<'a>(sink: &'a dyn IncomingSink, source: &'a str, _: &'a str) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        sink.on_start(source).await;
        true
    })
}

fn handle_close<'a>(sink: &'a dyn IncomingSink, source: &'a str, _: &'a str) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        sink.on_close(source).await;
        true
    })
}

fn handle_answer<'a>(
    sink: &'a dyn IncomingSink,
    source: &'a str,
    parameter: &'a str,
) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        sink.on_answer(source, parameter).await;
        true
    })
}

fn handle_candidate<'a>(
    sink: &'a dyn IncomingSink,
    source: &'a str,
    parameter: &'a str,
) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        match decode_candidates(parameter) {
            Ok(candidates) => {
                sink.on_candidates(source, candidates).await;
                true
            }
            Err(e) => {
                warn!("Candidate list from '{}' rejected: {}", source, e);
                false
            }
        }
    })
}

fn handle_acquire<'a>(sink: &'a dyn IncomingSink, source: &'a str, _: &'a str) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        sink.on_acquire(source).await;
        true
    })
}

/// Routes inbound envelopes by method and builds outbound ones
pub struct CommandDispatcher {
    handlers: HashMap<&'static str, Handler>,
    outgoing: Arc<dyn OutboundTransport>,
}

impl CommandDispatcher {
    /// Create a dispatcher with the full inbound method table
    pub fn new(outgoing: Arc<dyn OutboundTransport>) -> Self {
        let mut dispatcher = Self {
            handlers: HashMap::new(),
            outgoing,
        };

        dispatcher.register(METHOD_START, handle_start);
        dispatcher.register(METHOD_CLOSE, handle_close);
        dispatcher.register(METHOD_ANSWER, handle_answer);
        dispatcher.register(METHOD_CANDIDATE, handle_candidate);
        dispatcher.register(METHOD_ACQUIRE, handle_acquire);

        dispatcher
    }

    fn register(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    /// Whether a handler exists for `method`
    pub fn handles(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Decode `raw` and route it to `sink`
    ///
    /// Every failure is logged here; the returned error is informational.
    pub async fn dispatch(&self, sink: &dyn IncomingSink, raw: &str) -> Result<()> {
        let envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping inbound message: {}", e);
                return Err(e);
            }
        };

        let Some(handler) = self.handlers.get(envelope.method.as_str()) else {
            warn!(
                "Unknown method '{}' from '{}', ignoring",
                envelope.method, envelope.source
            );
            return Err(AppError::UnknownMethod(envelope.method));
        };

        trace!("Dispatching '{}' from '{}'", envelope.method, envelope.source);

        if !handler(sink, &envelope.source, &envelope.parameter).await {
            warn!(
                "Dispatch of '{}' from '{}' failed",
                envelope.method, envelope.source
            );
            return Err(AppError::DispatchFailed(envelope.method));
        }

        Ok(())
    }

    /// Send an SDP offer to `destination`
    pub fn send_offer(&self, destination: &str, sdp: &str) {
        self.send(Envelope::outbound(METHOD_OFFER, destination, sdp));
    }

    /// Send a batch of local ICE candidates to `destination`
    pub fn send_ice_candidates(&self, destination: &str, candidates: &[IceCandidate]) {
        let parameter = match encode_candidates(candidates) {
            Ok(parameter) => parameter,
            Err(e) => {
                debug!("Dropping candidate batch for '{}': {}", destination, e);
                return;
            }
        };
        self.send(Envelope::outbound(METHOD_CANDIDATE, destination, parameter));
    }

    fn send(&self, envelope: Envelope) {
        match envelope.encode() {
            Ok(text) => self.outgoing.send_message(text),
            Err(e) => debug!(
                "Dropping outbound '{}' for '{}': {}",
                envelope.method, envelope.destination, e
            ),
        }
    }
}
