//! Command surface against the vendor call-control API.
//!
//! Every command is a thin HTTP call with bearer auth and a bounded
//! timeout. A non-success vendor status surfaces as
//! [`CoreError::UpstreamApi`] carrying the vendor's status code; transport
//! failures and timeouts surface the same way so a held session gate is
//! never hostage to a slow PBX.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};
use crate::types::{DeviceInfo, DnInfo, Participant};

/// Connection settings for the vendor PBX.
#[derive(Debug, Clone)]
pub struct PbxConfig {
    /// Base URL of the call-control API, e.g. `https://pbx.example.com`
    pub base_url: String,
    /// Websocket URL for the event stream; derived from `base_url` when
    /// unset
    pub ws_url: Option<String>,
    /// Bearer token presented on every request
    pub token: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Cap for the event-stream reconnect backoff
    pub max_reconnect_backoff: Duration,
}

impl Default for PbxConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            ws_url: None,
            token: String::new(),
            request_timeout: Duration::from_secs(10),
            max_reconnect_backoff: Duration::from_secs(30),
        }
    }
}

impl PbxConfig {
    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The effective websocket URL for the event stream.
    pub fn event_stream_url(&self) -> String {
        match &self.ws_url {
            Some(url) => url.clone(),
            None => {
                let base = self.base_url.trim_end_matches('/');
                let ws = if let Some(rest) = base.strip_prefix("https://") {
                    format!("wss://{}", rest)
                } else if let Some(rest) = base.strip_prefix("http://") {
                    format!("ws://{}", rest)
                } else {
                    base.to_string()
                };
                format!("{}/callcontrol/ws", ws)
            }
        }
    }
}

/// Full topology for one DN as returned by the vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnTopology {
    /// The DN itself
    #[serde(flatten)]
    pub dn: DnInfo,
    /// Devices registered against the DN
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
    /// Current call legs on the DN
    #[serde(default)]
    pub participants: Vec<Participant>,
}

/// Vendor call-control commands used by the bridge and the call actions.
///
/// A trait seam so actions can be exercised against a recording fake.
#[async_trait]
pub trait CallControlApi: Send + Sync {
    /// Fetch the full topology visible to this token.
    async fn fetch_topology(&self) -> CoreResult<Vec<DnTopology>>;

    /// Place an outgoing call from `dn`, optionally anchored on a device.
    async fn make_call(&self, dn: &str, device_id: Option<&str>, destination: &str)
        -> CoreResult<()>;

    /// Answer a ringing participant.
    async fn answer_participant(&self, dn: &str, participant_id: &str) -> CoreResult<()>;

    /// Drop a participant.
    async fn drop_participant(&self, dn: &str, participant_id: &str) -> CoreResult<()>;

    /// Divert a ringing participant away, optionally to voicemail.
    async fn divert_participant(
        &self,
        dn: &str,
        participant_id: &str,
        voicemail: bool,
    ) -> CoreResult<()>;

    /// Blind-transfer a participant to another destination.
    async fn transfer_participant(
        &self,
        dn: &str,
        participant_id: &str,
        destination: &str,
    ) -> CoreResult<()>;
}

/// HTTP implementation of [`CallControlApi`].
pub struct PbxClient {
    http: reqwest::Client,
    config: PbxConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MakeCallBody<'a> {
    destination: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_id: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DivertBody {
    voicemail: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferBody<'a> {
    destination: &'a str,
}

impl PbxClient {
    /// Build a client for `config`.
    pub fn new(config: PbxConfig) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CoreError::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Build a client and wrap it for injection.
    pub fn shared(config: PbxConfig) -> CoreResult<Arc<dyn CallControlApi>> {
        Ok(Arc::new(Self::new(config)?))
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> CoreResult<reqwest::Response> {
        let response = request
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::upstream(504, "PBX request timed out")
                } else {
                    CoreError::upstream(502, format!("PBX request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let mut message = body.trim().to_string();
            message.truncate(200);
            if message.is_empty() {
                message = status
                    .canonical_reason()
                    .unwrap_or("request rejected")
                    .to_string();
            }
            return Err(CoreError::upstream(status.as_u16(), message));
        }
        Ok(response)
    }

    async fn post_command<B: Serialize>(&self, path: &str, body: Option<&B>) -> CoreResult<()> {
        let mut request = self.http.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl CallControlApi for PbxClient {
    async fn fetch_topology(&self) -> CoreResult<Vec<DnTopology>> {
        let response = self.send(self.http.get(self.url("callcontrol"))).await?;
        response
            .json()
            .await
            .map_err(|e| CoreError::upstream(502, format!("malformed topology response: {}", e)))
    }

    async fn make_call(
        &self,
        dn: &str,
        device_id: Option<&str>,
        destination: &str,
    ) -> CoreResult<()> {
        let body = MakeCallBody {
            destination,
            device_id,
        };
        self.post_command(&format!("callcontrol/{}/makecall", dn), Some(&body))
            .await
    }

    async fn answer_participant(&self, dn: &str, participant_id: &str) -> CoreResult<()> {
        self.post_command::<()>(
            &format!("callcontrol/{}/participants/{}/answer", dn, participant_id),
            None,
        )
        .await
    }

    async fn drop_participant(&self, dn: &str, participant_id: &str) -> CoreResult<()> {
        self.post_command::<()>(
            &format!("callcontrol/{}/participants/{}/drop", dn, participant_id),
            None,
        )
        .await
    }

    async fn divert_participant(
        &self,
        dn: &str,
        participant_id: &str,
        voicemail: bool,
    ) -> CoreResult<()> {
        let body = DivertBody { voicemail };
        self.post_command(
            &format!("callcontrol/{}/participants/{}/divert", dn, participant_id),
            Some(&body),
        )
        .await
    }

    async fn transfer_participant(
        &self,
        dn: &str,
        participant_id: &str,
        destination: &str,
    ) -> CoreResult<()> {
        let body = TransferBody { destination };
        self.post_command(
            &format!("callcontrol/{}/participants/{}/transferto", dn, participant_id),
            Some(&body),
        )
        .await
    }
}
