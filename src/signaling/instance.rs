//! Signaling state bound to one transport connection

use std::sync::Arc;

use tracing::{debug, info};

use super::dispatcher::{CommandDispatcher, OutboundTransport};
use crate::error::Result;
use crate::session::{SessionFactory, SessionRegistry};

/// Dispatcher plus session registry for one established connection
///
/// Inbound texts must be fed one at a time; each is fully dispatched before
/// the next is read.
pub struct SignalingInstance {
    dispatcher: Arc<CommandDispatcher>,
    registry: SessionRegistry,
}

impl SignalingInstance {
    pub fn new(outgoing: Arc<dyn OutboundTransport>, factory: Arc<dyn SessionFactory>) -> Self {
        let dispatcher = Arc::new(CommandDispatcher::new(outgoing));
        let registry = SessionRegistry::new(factory, dispatcher.clone());
        debug!("Signaling instance created");
        Self {
            dispatcher,
            registry,
        }
    }

    /// Dispatch one inbound text message
    pub async fn receive_message(&self, text: &str) -> Result<()> {
        self.dispatcher.dispatch(&self.registry, text).await
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    /// Close every session; call before the connection goes away
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        info!("Signaling instance shut down");
    }
}
