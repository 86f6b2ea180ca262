//! The vendor event websocket.

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::errors::{CoreError, CoreResult};
use crate::pbx::events::PbxEvent;

/// A live connection to the vendor event stream.
pub struct PbxEventStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PbxEventStream {
    /// Open the event websocket with bearer auth.
    pub async fn connect(url: &str, token: &str) -> CoreResult<Self> {
        let mut request = url
            .into_client_request()
            .map_err(|e| CoreError::upstream(502, format!("invalid event stream URL: {}", e)))?;
        let header = format!("Bearer {}", token)
            .parse()
            .map_err(|_| CoreError::internal("PBX token is not a valid header value"))?;
        request.headers_mut().insert(AUTHORIZATION, header);

        let (inner, _) = connect_async(request)
            .await
            .map_err(|e| CoreError::upstream(502, format!("event stream connect failed: {}", e)))?;
        Ok(Self { inner })
    }

    /// Next event frame. `None` means the stream closed cleanly.
    ///
    /// Frames that fail to parse are logged and skipped - one malformed
    /// event must not tear down the stream.
    pub async fn next_event(&mut self) -> CoreResult<Option<PbxEvent>> {
        while let Some(frame) = self.inner.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<PbxEvent>(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping malformed PBX event frame");
                    }
                },
                Ok(Message::Close(_)) => return Ok(None),
                Ok(_) => {}
                Err(e) => {
                    return Err(CoreError::upstream(
                        502,
                        format!("event stream read failed: {}", e),
                    ));
                }
            }
        }
        Ok(None)
    }
}
