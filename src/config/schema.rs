use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::render::PatternRendererConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Signaling server connection
    pub signaling: SignalingConfig,
    /// Peer connection settings
    pub webrtc: WebRtcConfig,
    /// Render instance settings
    pub render: RenderConfig,
}

impl AppConfig {
    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.signaling.path.starts_with('/') {
            return Err(AppError::Config(format!(
                "signaling path must start with '/': {}",
                self.signaling.path
            )));
        }
        if self.signaling.host.is_empty() {
            return Err(AppError::Config("signaling host is empty".to_string()));
        }
        if self.render.fps == 0 {
            return Err(AppError::Config("render fps must be non-zero".to_string()));
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(AppError::Config(format!(
                "invalid render size {}x{}",
                self.render.width, self.render.height
            )));
        }
        if self.render.frame_queue == 0 {
            return Err(AppError::Config("render frame_queue must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Signaling server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalingConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// WebSocket path
    pub path: String,
    /// Delay before reconnecting (ms); 0 disables reconnect
    pub reconnect_delay_ms: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            path: "/wssrv".to_string(),
            reconnect_delay_ms: 2000,
        }
    }
}

impl SignalingConfig {
    /// WebSocket URL of the signaling server
    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Peer connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// STUN server URLs
    pub stun_servers: Vec<String>,
    /// TURN servers
    pub turn_servers: Vec<TurnServer>,
    /// Label of the control data channel
    pub data_channel_label: String,
    /// Video track id
    pub track_id: String,
    /// Media stream id
    pub stream_id: String,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: vec![],
            data_channel_label: "data_channel".to_string(),
            track_id: "track0".to_string(),
            stream_id: "render-relay".to_string(),
        }
    }
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnServer {
    /// TURN server URLs, tried in order
    pub urls: Vec<String>,
    /// Username for TURN authentication
    pub username: String,
    /// Credential for TURN authentication
    pub credential: String,
}

/// Render configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Ticks per second
    pub fps: u32,
    /// Frames queued for the video track before new ones are dropped
    pub frame_queue: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 544,
            fps: 60,
            frame_queue: 4,
        }
    }
}

impl RenderConfig {
    pub fn pattern(&self) -> PatternRendererConfig {
        PatternRendererConfig {
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }
}
