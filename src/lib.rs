//! render-relay - WebRTC signaling and peer session orchestration
//!
//! Connects to a signaling server, negotiates one peer connection per remote
//! identifier and streams frames from a per-session render instance driven by
//! a drift-free scheduler, with pointer input arriving over a data channel.

pub mod config;
pub mod error;
pub mod input;
pub mod render;
pub mod rtc;
pub mod session;
pub mod signaling;

pub use error::{AppError, Result};
