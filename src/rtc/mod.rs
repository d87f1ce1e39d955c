//! webrtc-rs negotiation and media backend
//!
//! ```text
//! PatternRenderer --on_frame--> FrameQueue --> sample writer task
//!                                                   |
//!                                                   v
//!                         TrackLocalStaticSample (H.264) --> RTCPeerConnection
//!                                                                  |
//!                          PeerEvents <-- "data_channel" text -----+
//! ```

pub mod media;
pub mod peer;

pub use media::{frame_queue, FrameEncoder, FrameQueue, FrameReceiver, PassthroughEncoder};
pub use peer::{WebRtcNegotiator, WebRtcSessionFactory};
