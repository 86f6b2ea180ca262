//! The seam over one native peer connection.
//!
//! [`PeerTransport`] is what the controller drives; [`WebRtcPeer`] is the
//! production implementation on the `webrtc` crate. Local candidates and
//! transport-state changes flow back through a [`PeerEvent`] channel so
//! the controller stays the single writer of per-call state.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::api::APIBuilder;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;

use crate::error::ClientResult;
use crate::media::MediaSource;

/// One remote ICE candidate, as carried in signaling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    /// The candidate line
    pub candidate: String,
    /// Media stream identification tag
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to
    pub sdp_m_line_index: Option<u16>,
}

/// Terminal transport states the controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Media path established
    Connected,
    /// Connectivity establishment gave up
    Failed,
    /// The peer connection was closed
    Closed,
}

/// What happened on a peer connection.
#[derive(Debug, Clone)]
pub enum PeerEventKind {
    /// A local candidate was discovered and should be signaled out
    LocalCandidate(IceCandidate),
    /// The transport state changed
    StateChanged(TransportState),
}

/// An event from one call's peer connection.
#[derive(Debug, Clone)]
pub struct PeerEvent {
    /// The local call leg the peer belongs to
    pub call_id: String,
    /// What happened
    pub kind: PeerEventKind,
}

/// Operations the controller needs from a peer connection.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Attach or replace the outbound audio track.
    async fn set_media(&self, source: Arc<dyn MediaSource>) -> ClientResult<()>;

    /// Create an offer and install it as the local description.
    async fn create_offer(&self) -> ClientResult<String>;

    /// Install a remote offer and produce the local answer.
    async fn accept_offer(&self, sdp: &str) -> ClientResult<String>;

    /// Install the remote answer.
    async fn accept_answer(&self, sdp: &str) -> ClientResult<()>;

    /// Apply one remote candidate. Callers must only invoke this after
    /// the remote description is installed.
    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> ClientResult<()>;

    /// Tear the connection down.
    async fn close(&self);
}

/// Creates peer transports; faked in tests.
#[async_trait]
pub trait PeerFactory: Send + Sync {
    /// Create the transport for one call, wiring its events into `events`.
    async fn create(
        &self,
        call_id: &str,
        events: mpsc::Sender<PeerEvent>,
    ) -> ClientResult<Arc<dyn PeerTransport>>;
}

/// STUN/TURN settings for the production factory.
#[derive(Debug, Clone)]
pub struct RtcSettings {
    /// ICE server URLs
    pub ice_servers: Vec<String>,
}

impl Default for RtcSettings {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

/// Production peer connection on the `webrtc` crate.
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    sender: tokio::sync::Mutex<Option<Arc<RTCRtpSender>>>,
}

impl WebRtcPeer {
    /// Build a peer connection and wire its callbacks into `events`.
    pub async fn new(
        settings: &RtcSettings,
        call_id: &str,
        events: mpsc::Sender<PeerEvent>,
    ) -> ClientResult<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let api = APIBuilder::new().with_media_engine(media_engine).build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: settings.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(config).await?);

        {
            let events = events.clone();
            let call_id = call_id.to_string();
            pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let events = events.clone();
                let call_id = call_id.clone();
                Box::pin(async move {
                    let Some(candidate) = candidate else { return };
                    match candidate.to_json() {
                        Ok(json) => {
                            let _ = events
                                .send(PeerEvent {
                                    call_id,
                                    kind: PeerEventKind::LocalCandidate(IceCandidate {
                                        candidate: json.candidate,
                                        sdp_mid: json.sdp_mid,
                                        sdp_m_line_index: json.sdp_mline_index,
                                    }),
                                })
                                .await;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to serialize local candidate");
                        }
                    }
                })
            }));
        }

        {
            let call_id = call_id.to_string();
            pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let events = events.clone();
                let call_id = call_id.clone();
                Box::pin(async move {
                    let mapped = match state {
                        RTCPeerConnectionState::Connected => Some(TransportState::Connected),
                        RTCPeerConnectionState::Failed => Some(TransportState::Failed),
                        RTCPeerConnectionState::Closed => Some(TransportState::Closed),
                        _ => None,
                    };
                    if let Some(state) = mapped {
                        let _ = events
                            .send(PeerEvent {
                                call_id,
                                kind: PeerEventKind::StateChanged(state),
                            })
                            .await;
                    }
                })
            }));
        }

        Ok(Self {
            pc,
            sender: tokio::sync::Mutex::new(None),
        })
    }
}

#[async_trait]
impl PeerTransport for WebRtcPeer {
    async fn set_media(&self, source: Arc<dyn MediaSource>) -> ClientResult<()> {
        let track = source.create_track().await?;
        let mut sender = self.sender.lock().await;
        match sender.as_ref() {
            // Live call: swap the outbound track without renegotiating.
            Some(existing) => {
                existing.replace_track(Some(track)).await?;
            }
            None => {
                let new_sender = self.pc.add_track(track).await?;
                *sender = Some(new_sender);
            }
        }
        Ok(())
    }

    async fn create_offer(&self) -> ClientResult<String> {
        let offer = self.pc.create_offer(None).await?;
        let sdp = offer.sdp.clone();
        self.pc.set_local_description(offer).await?;
        Ok(sdp)
    }

    async fn accept_offer(&self, sdp: &str) -> ClientResult<String> {
        let offer = RTCSessionDescription::offer(sdp.to_string())?;
        self.pc.set_remote_description(offer).await?;
        let answer = self.pc.create_answer(None).await?;
        let answer_sdp = answer.sdp.clone();
        self.pc.set_local_description(answer).await?;
        Ok(answer_sdp)
    }

    async fn accept_answer(&self, sdp: &str) -> ClientResult<()> {
        let answer = RTCSessionDescription::answer(sdp.to_string())?;
        self.pc.set_remote_description(answer).await?;
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> ClientResult<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate.clone(),
                sdp_mid: candidate.sdp_mid.clone(),
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: None,
            })
            .await?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            tracing::debug!(error = %e, "peer connection close reported an error");
        }
    }
}

/// Factory producing [`WebRtcPeer`]s.
pub struct WebRtcPeerFactory {
    settings: RtcSettings,
}

impl WebRtcPeerFactory {
    /// Create a factory with the given ICE settings.
    pub fn new(settings: RtcSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(
        &self,
        call_id: &str,
        events: mpsc::Sender<PeerEvent>,
    ) -> ClientResult<Arc<dyn PeerTransport>> {
        let peer = WebRtcPeer::new(&self.settings, call_id, events).await?;
        Ok(Arc::new(peer))
    }
}
