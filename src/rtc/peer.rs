//! webrtc-rs backed negotiation collaborator

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::media::{frame_queue, spawn_sample_writer, FrameEncoder};
use crate::config::{RenderConfig, WebRtcConfig};
use crate::error::{AppError, Result};
use crate::input::InputReceiver;
use crate::render::PatternRenderer;
use crate::session::{Negotiator, PeerBinding, PeerEvents, SdpKind, SessionFactory};
use crate::signaling::IceCandidate;

fn description(kind: SdpKind, sdp: String) -> Result<RTCSessionDescription> {
    let parsed = match kind {
        SdpKind::Offer => RTCSessionDescription::offer(sdp),
        SdpKind::Answer => RTCSessionDescription::answer(sdp),
    };
    parsed.map_err(|e| AppError::NegotiationParse(format!("invalid SDP {}: {}", kind, e)))
}

/// One RTCPeerConnection
pub struct WebRtcNegotiator {
    identifier: String,
    pc: Arc<RTCPeerConnection>,
    writer_cancel: CancellationToken,
}

#[async_trait]
impl Negotiator for WebRtcNegotiator {
    async fn create_offer(&self) -> Result<String> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create offer: {}", e)))?;
        Ok(offer.sdp)
    }

    async fn set_local_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        let desc = description(kind, sdp)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        let desc = description(kind, sdp)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to set remote description: {}", e)))
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.sdp,
            sdp_mid: Some(candidate.sdp_mid),
            sdp_mline_index: Some(candidate.sdp_mline_index),
            username_fragment: None,
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| AppError::NegotiationParse(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) {
        self.writer_cancel.cancel();
        if let Err(e) = self.pc.close().await {
            warn!("Failed to close peer connection {}: {}", self.identifier, e);
        }
        debug!("Peer connection {} closed", self.identifier);
    }
}

/// Creates a peer connection, video track, control data channel and
/// pattern renderer for every new session
pub struct WebRtcSessionFactory {
    api: API,
    webrtc: WebRtcConfig,
    render: RenderConfig,
    encoder: Arc<dyn FrameEncoder>,
}

impl WebRtcSessionFactory {
    pub fn new(
        webrtc: WebRtcConfig,
        render: RenderConfig,
        encoder: Arc<dyn FrameEncoder>,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            AppError::WebRtcError(format!("Failed to register interceptors: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api,
            webrtc,
            render,
            encoder,
        })
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        let mut ice_servers = vec![];

        for stun_url in &self.webrtc.stun_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![stun_url.clone()],
                ..Default::default()
            });
        }

        for turn in &self.webrtc.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: turn.urls.clone(),
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }

    fn register_handlers(pc: &RTCPeerConnection, identifier: &str, events: &PeerEvents) {
        let session_id = identifier.to_string();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            info!("Peer {} connection state: {}", session_id, s);
            Box::pin(async {})
        }));

        let events = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => events.ice_candidate_gathered(IceCandidate::new(
                        init.candidate,
                        init.sdp_mid.unwrap_or_default(),
                        init.sdp_mline_index.unwrap_or_default(),
                    )),
                    Err(e) => debug!("Failed to serialize local candidate: {}", e),
                }
            })
        }));
    }
}

#[async_trait]
impl SessionFactory for WebRtcSessionFactory {
    async fn create(
        &self,
        identifier: &str,
        events: PeerEvents,
        input: InputReceiver,
    ) -> Result<PeerBinding> {
        let pc = self
            .api
            .new_peer_connection(self.rtc_configuration())
            .await
            .map_err(|e| {
                AppError::WebRtcError(format!("Failed to create peer connection: {}", e))
            })?;
        let pc = Arc::new(pc);

        Self::register_handlers(&pc, identifier, &events);

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                ..Default::default()
            },
            self.webrtc.track_id.clone(),
            self.webrtc.stream_id.clone(),
        ));
        let sender = pc
            .add_track(track.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to add video track: {}", e)))?;

        // RTCP has to be read for interceptors to run
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });

        let dc = pc
            .create_data_channel(&self.webrtc.data_channel_label, None)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create data channel: {}", e)))?;
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            if msg.is_string {
                match std::str::from_utf8(&msg.data) {
                    Ok(text) => events.control_message(text),
                    Err(_) => debug!("Non UTF-8 control message, ignoring"),
                }
            }
            Box::pin(async {})
        }));

        let (queue, frames) = frame_queue(self.render.frame_queue, self.encoder.clone());
        let writer_cancel = CancellationToken::new();
        spawn_sample_writer(
            identifier.to_string(),
            frames,
            track,
            self.render.fps,
            writer_cancel.clone(),
        );

        let render = PatternRenderer::new(identifier, self.render.pattern(), input, Arc::new(queue));

        info!("Peer connection created for {}", identifier);

        Ok(PeerBinding {
            negotiator: Arc::new(WebRtcNegotiator {
                identifier: identifier.to_string(),
                pc,
                writer_cancel,
            }),
            render: Box::new(render),
        })
    }
}
