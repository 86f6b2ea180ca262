//! Wire types for the realtime channel.
//!
//! Inbound frames are [`RpcRequest`]s; outbound frames are either an
//! [`RpcResponse`] (carrying an `id`) or a [`PushMessage`] (carrying a
//! `type`), so clients can tell them apart without a shared envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use webcall_session_core::browser::call::BrowserCall;
use webcall_session_core::browser::signal::SignalMessage;
use webcall_session_core::errors::CoreError;
use webcall_session_core::types::SessionSnapshotResponse;

use crate::error::{name_for, public_message};

/// One inbound RPC frame.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    /// Client-chosen correlation id
    pub id: u64,
    /// Method name, e.g. `placeCall`
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Client-visible fault for a classified error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcFault {
    /// Taxonomy name
    pub name: &'static str,
    /// Human-readable message
    pub message: String,
    /// Stable machine-readable code
    pub error_code: &'static str,
}

impl RpcFault {
    /// Build the fault for a classified error.
    pub fn from_error(error: &CoreError) -> Self {
        Self {
            name: name_for(error),
            message: public_message(error),
            error_code: error.error_code(),
        }
    }
}

/// One outbound RPC response frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    /// Mirrors the request id
    pub id: u64,
    /// Whether the call succeeded
    pub success: bool,
    /// Result payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Fault on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcFault>,
}

impl RpcResponse {
    /// A successful response.
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// A failed response carrying a classified fault.
    pub fn fault(id: u64, error: &CoreError) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(RpcFault::from_error(error)),
        }
    }
}

/// One outbound push frame.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum PushMessage {
    /// Full session state after a change
    SessionSnapshot(SessionSnapshotResponse),
    /// Browser call list, sent to a freshly bound connection
    BrowserCallsSnapshot(Vec<BrowserCall>),
    /// One browser call changed
    BrowserCallUpdated(BrowserCall),
    /// A relayed WebRTC signal
    WebRtcSignal(SignalMessage),
    /// A non-topology PBX event
    Event {
        /// Vendor event type
        event_type: String,
        /// When the server observed it
        occurred_at_utc: DateTime<Utc>,
        /// Vendor payload, passed through
        payload: serde_json::Value,
    },
}

/// Parameters for `placeCall`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceCallParams {
    /// Extension to call
    pub destination_extension: String,
}

/// Parameters for the per-call RPCs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIdParams {
    /// Target call id
    pub call_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_with_and_without_params() {
        let raw = r#"{"id": 7, "method": "placeCall", "params": {"destinationExtension": "101"}}"#;
        let request: RpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.id, 7);
        assert_eq!(request.method, "placeCall");

        let raw = r#"{"id": 8, "method": "noop"}"#;
        let request: RpcRequest = serde_json::from_str(raw).unwrap();
        assert!(request.params.is_null());
    }

    #[test]
    fn fault_shape() {
        let response = RpcResponse::fault(3, &CoreError::not_found("unknown call c9"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["name"], "NotFound");
        assert_eq!(value["error"]["errorCode"], "NOT_FOUND");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn internal_fault_is_generic() {
        let response = RpcResponse::fault(1, &CoreError::internal("stacktrace here"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error"]["message"], "internal server error");
    }

    #[test]
    fn push_envelope_shape() {
        let push = PushMessage::Event {
            event_type: "DtmfString".into(),
            occurred_at_utc: Utc::now(),
            payload: serde_json::json!({"digits": "42#"}),
        };
        let value = serde_json::to_value(&push).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["payload"]["eventType"], "DtmfString");
        assert_eq!(value["payload"]["payload"]["digits"], "42#");
    }

    #[test]
    fn call_push_uses_camel_case_tag() {
        let call = BrowserCall::outgoing("s1", "100", "101");
        let push = PushMessage::BrowserCallUpdated(call);
        let value = serde_json::to_value(&push).unwrap();
        assert_eq!(value["type"], "browserCallUpdated");
        assert_eq!(value["payload"]["localExtension"], "100");
    }
}
