//! Signaling channel
//!
//! Envelopes are JSON objects `{method, parameter, source, destination}`
//! carried as text frames. Inbound methods: `start`, `close`, `answer`,
//! `candidate`, `acquire`. Outbound methods: `offer`, `candidate`.

pub mod dispatcher;
pub mod instance;
pub mod message;
pub mod transport;

pub use dispatcher::{CommandDispatcher, IncomingSink, OutboundTransport};
pub use instance::SignalingInstance;
pub use message::{decode_candidates, encode_candidates, Envelope, IceCandidate};
pub use transport::run_client;
