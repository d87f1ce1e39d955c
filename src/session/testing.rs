//! In-memory collaborators for session tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::negotiator::{Negotiator, PeerBinding, SdpKind, SessionFactory};
use super::peer::{PeerEvents, PeerSession};
use crate::error::{AppError, Result};
use crate::input::{InputReceiver, PointerState};
use crate::render::RenderInstance;
use crate::signaling::{CommandDispatcher, Envelope, IceCandidate};

type EventLog = Arc<Mutex<Vec<String>>>;

pub fn candidate(sdp: &str) -> IceCandidate {
    IceCandidate::new(sdp, "0", 0)
}

/// Next outbound envelope, failing the test after two seconds
pub async fn next_envelope(rx: &mut mpsc::UnboundedReceiver<String>) -> Envelope {
    let raw = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for outbound message")
        .expect("outbound channel closed");
    Envelope::decode(&raw).expect("outbound message must decode")
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub struct FakeNegotiator {
    identifier: String,
    log: EventLog,
    fail_offer: bool,
    answer_delay: Option<Duration>,
    remote_set: AtomicBool,
    closed: AtomicBool,
}

impl FakeNegotiator {
    fn record(&self, event: impl std::fmt::Display) {
        self.log.lock().push(format!("{}:{}", self.identifier, event));
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::WebRtcError("connection closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Negotiator for FakeNegotiator {
    async fn create_offer(&self) -> Result<String> {
        self.check_open()?;
        self.record("create_offer");
        if self.fail_offer {
            return Err(AppError::WebRtcError("offer refused".to_string()));
        }
        Ok(format!("v=0 offer {}", self.identifier))
    }

    async fn set_local_description(&self, kind: SdpKind, _sdp: String) -> Result<()> {
        self.check_open()?;
        self.record(format!("set_local:{}", kind));
        Ok(())
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        self.check_open()?;
        if !sdp.starts_with("v=0") {
            self.record(format!("set_remote:{}:rejected", kind));
            return Err(AppError::NegotiationParse(format!("invalid {} sdp", kind)));
        }
        if let Some(delay) = self.answer_delay {
            tokio::time::sleep(delay).await;
        }
        self.remote_set.store(true, Ordering::SeqCst);
        self.record(format!("set_remote:{}", kind));
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.check_open()?;
        if candidate.sdp.is_empty() {
            self.record("add_candidate:rejected");
            return Err(AppError::NegotiationParse("empty candidate".to_string()));
        }
        // Slow backends behave like a real peer connection here
        if self.answer_delay.is_some() && !self.remote_set.load(Ordering::SeqCst) {
            self.record("add_candidate:no_remote");
            return Err(AppError::WebRtcError("no remote description".to_string()));
        }
        self.record(format!("add_candidate:{}", candidate.sdp));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.record("close");
    }
}

pub struct FakeRender {
    identifier: String,
    log: EventLog,
    running: bool,
}

impl RenderInstance for FakeRender {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        self.log.lock().push(format!("{}:render_start", self.identifier));
        Ok(())
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.log.lock().push(format!("{}:render_stop", self.identifier));
        }
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// Records every collaborator call and keeps each session's callback handle
#[derive(Default)]
pub struct FakeFactory {
    log: EventLog,
    fail_offer: bool,
    answer_delay: Option<Duration>,
    events: Mutex<HashMap<String, PeerEvents>>,
    inputs: Mutex<HashMap<String, InputReceiver>>,
}

impl FakeFactory {
    pub fn failing_offers() -> Self {
        Self {
            fail_offer: true,
            ..Default::default()
        }
    }

    /// Answers take `delay` to apply; remote candidates are refused until then
    pub fn slow_answers(delay: Duration) -> Self {
        Self {
            answer_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.log.lock().iter().filter(|e| *e == event).count()
    }

    /// Callback handle of the most recent session created for `identifier`
    pub fn events(&self, identifier: &str) -> PeerEvents {
        self.events
            .lock()
            .get(identifier)
            .cloned()
            .expect("no session created for identifier")
    }

    pub fn drain_input(&self, identifier: &str, pointer: &mut PointerState) -> usize {
        self.inputs
            .lock()
            .get_mut(identifier)
            .map(|input| input.drain_into(pointer))
            .unwrap_or(0)
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn create(
        &self,
        identifier: &str,
        events: PeerEvents,
        input: InputReceiver,
    ) -> Result<PeerBinding> {
        self.log.lock().push(format!("{}:create", identifier));
        self.events.lock().insert(identifier.to_string(), events);
        self.inputs.lock().insert(identifier.to_string(), input);

        Ok(PeerBinding {
            negotiator: Arc::new(FakeNegotiator {
                identifier: identifier.to_string(),
                log: self.log.clone(),
                fail_offer: self.fail_offer,
                answer_delay: self.answer_delay,
                remote_set: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
            render: Box::new(FakeRender {
                identifier: identifier.to_string(),
                log: self.log.clone(),
                running: false,
            }),
        })
    }
}

/// Dispatcher wired to an in-memory outbound channel
pub struct Harness {
    pub factory: Arc<FakeFactory>,
    pub messenger: Arc<CommandDispatcher>,
    pub outbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl Harness {
    pub fn new(factory: FakeFactory) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        Self {
            factory: Arc::new(factory),
            messenger: Arc::new(CommandDispatcher::new(Arc::new(tx))),
            outbound: tokio::sync::Mutex::new(rx),
        }
    }

    pub async fn session(&self, identifier: &str) -> PeerSession {
        PeerSession::create(identifier, self.messenger.clone(), self.factory.as_ref())
            .await
            .expect("fake factory never fails")
    }

    /// Decoded outbound messages currently queued
    pub async fn drain_outbound(&self) -> Vec<Envelope> {
        let mut rx = self.outbound.lock().await;
        let mut messages = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            if let Ok(envelope) = Envelope::decode(&raw) {
                messages.push(envelope);
            }
        }
        messages
    }
}
