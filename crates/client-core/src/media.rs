//! Audio sources feeding the peer connections.
//!
//! Device capture is platform territory; the controller only needs
//! something that can mint a local track. Switching sources replaces the
//! track on every live sender without touching the session description.

use std::sync::Arc;

use async_trait::async_trait;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::error::ClientResult;

/// A selectable audio input.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Stable device identifier
    fn device_id(&self) -> &str;

    /// Human-readable label
    fn label(&self) -> &str;

    /// Mint a fresh local track for a peer connection.
    async fn create_track(&self) -> ClientResult<Arc<dyn TrackLocal + Send + Sync>>;
}

/// Source producing a silent Opus track. Stands in when no capture device
/// is available, and keeps the media path exercisable in tests and demos.
pub struct SilentAudioSource {
    device_id: String,
    label: String,
}

impl SilentAudioSource {
    /// Create the silent source.
    pub fn new() -> Self {
        Self {
            device_id: "silence".to_string(),
            label: "Silent audio".to_string(),
        }
    }
}

impl Default for SilentAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for SilentAudioSource {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn label(&self) -> &str {
        &self.label
    }

    async fn create_track(&self) -> ClientResult<Arc<dyn TrackLocal + Send + Sync>> {
        let track = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            "audio".to_owned(),
            "webcall".to_owned(),
        );
        Ok(Arc::new(track))
    }
}
