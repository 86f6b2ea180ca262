//! Per-call media orchestration.
//!
//! The controller owns every peer connection on this client, keyed by the
//! local call id. All mutating flows run under one async mutex, so no
//! peer connection is ever touched from two logical flows at once; the
//! pending-ICE queue and pending-offer cache absorb out-of-order network
//! delivery between suspension points.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use webcall_session_core::browser::call::{BrowserCall, BrowserCallStatus};
use webcall_session_core::browser::signal::{SignalBody, SignalMessage};

use crate::error::{ClientError, ClientResult};
use crate::events::ClientEventHandler;
use crate::media::MediaSource;
use crate::peer::{IceCandidate, PeerEvent, PeerEventKind, PeerFactory, PeerTransport, TransportState};
use crate::signaling::ConsoleClient;

#[derive(Default)]
struct PeerSlot {
    peer: Option<Arc<dyn PeerTransport>>,
    /// Whether the remote description is installed; candidates arriving
    /// earlier wait in `pending_ice`
    remote_described: bool,
    /// Remote candidates queued until the remote description lands,
    /// flushed in arrival order exactly once
    pending_ice: Vec<IceCandidate>,
    /// The last unconsumed remote offer, parked until `answer`
    pending_offer: Option<String>,
}

#[derive(Default)]
struct ControllerState {
    calls: HashMap<String, BrowserCall>,
    peers: HashMap<String, PeerSlot>,
}

/// Client-side controller: one peer connection per call id.
pub struct CallMediaController {
    client: Arc<dyn ConsoleClient>,
    factory: Arc<dyn PeerFactory>,
    handler: Arc<dyn ClientEventHandler>,
    media: parking_lot::Mutex<Arc<dyn MediaSource>>,
    inner: tokio::sync::Mutex<ControllerState>,
    events_tx: mpsc::Sender<PeerEvent>,
}

enum UpdateOutcome {
    Incoming,
    Updated,
    Ended {
        reason: Option<String>,
        last_peer_gone: bool,
    },
}

impl CallMediaController {
    /// Create the controller and start its peer-event pump.
    pub fn new(
        client: Arc<dyn ConsoleClient>,
        factory: Arc<dyn PeerFactory>,
        handler: Arc<dyn ClientEventHandler>,
        media: Arc<dyn MediaSource>,
    ) -> Arc<Self> {
        let (events_tx, mut events_rx) = mpsc::channel::<PeerEvent>(64);
        let controller = Arc::new(Self {
            client,
            factory,
            handler,
            media: parking_lot::Mutex::new(media),
            inner: tokio::sync::Mutex::new(ControllerState::default()),
            events_tx,
        });

        let weak = Arc::downgrade(&controller);
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                controller.handle_peer_event(event).await;
            }
        });

        controller
    }

    /// Ingest a browser call push from the server.
    pub async fn handle_call_update(&self, call: BrowserCall) {
        let outcome = {
            let mut state = self.inner.lock().await;
            if call.is_terminal() {
                state.calls.remove(&call.id);
                let peer = state.peers.remove(&call.id).and_then(|slot| slot.peer);
                if let Some(peer) = peer {
                    peer.close().await;
                }
                UpdateOutcome::Ended {
                    reason: call.end_reason.clone(),
                    last_peer_gone: state.peers.is_empty(),
                }
            } else {
                let previous = state.calls.insert(call.id.clone(), call.clone());
                if previous.is_none()
                    && call.incoming
                    && call.status == BrowserCallStatus::Ringing
                {
                    UpdateOutcome::Incoming
                } else {
                    UpdateOutcome::Updated
                }
            }
        };

        match outcome {
            UpdateOutcome::Incoming => self.handler.on_incoming_call(&call).await,
            UpdateOutcome::Updated => self.handler.on_call_updated(&call).await,
            UpdateOutcome::Ended {
                reason,
                last_peer_gone,
            } => {
                self.handler.on_call_ended(&call.id, reason.as_deref()).await;
                if last_peer_gone {
                    self.handler.on_remote_audio_cleared().await;
                }
            }
        }
    }

    /// Start media for a freshly placed outgoing call: create the peer,
    /// produce the offer and send it for relay.
    pub async fn start_outgoing(&self, call: &BrowserCall) -> ClientResult<()> {
        let sdp = {
            let mut state = self.inner.lock().await;
            state.calls.insert(call.id.clone(), call.clone());
            let peer = self.ensure_peer(&mut state, &call.id).await?;
            peer.create_offer().await?
        };

        self.client
            .send_signal(outbound_signal(call, SignalBody::Offer { sdp }))
            .await
    }

    /// Ingest a relayed signal.
    ///
    /// The signal carries the remote leg's call id; it is resolved to the
    /// local leg through the source extension. Signals that resolve to
    /// nothing are dropped - the call may have just ended.
    pub async fn handle_signal(&self, message: SignalMessage) -> ClientResult<()> {
        let mut state = self.inner.lock().await;
        let Some(local) = resolve_local(&state, &message.from_extension) else {
            tracing::debug!(
                from = %message.from_extension,
                "dropping signal with no matching local call"
            );
            return Ok(());
        };

        match message.body {
            SignalBody::Offer { sdp } => {
                if local.status == BrowserCallStatus::Ringing {
                    // A fresh inbound ring waits for the explicit answer;
                    // only the latest offer matters.
                    state
                        .peers
                        .entry(local.id.clone())
                        .or_default()
                        .pending_offer = Some(sdp);
                    Ok(())
                } else {
                    // The call is already accepted: this is a
                    // renegotiation, answer it immediately.
                    self.answer_offer(&mut state, &local, sdp).await
                }
            }
            SignalBody::Answer { sdp } => {
                let Some(peer) = state
                    .peers
                    .get(&local.id)
                    .and_then(|slot| slot.peer.clone())
                else {
                    tracing::debug!(call_id = %local.id, "answer for a call with no peer");
                    return Ok(());
                };
                peer.accept_answer(&sdp).await?;
                self.flush_after_remote_description(&mut state, &local.id, &peer)
                    .await;
                Ok(())
            }
            SignalBody::Ice {
                candidate,
                sdp_mid,
                sdp_m_line_index,
            } => {
                let candidate = IceCandidate {
                    candidate,
                    sdp_mid,
                    sdp_m_line_index,
                };
                let slot = state.peers.entry(local.id.clone()).or_default();
                if slot.remote_described {
                    if let Some(peer) = slot.peer.clone() {
                        peer.add_remote_candidate(&candidate).await?;
                    }
                } else {
                    slot.pending_ice.push(candidate);
                }
                Ok(())
            }
        }
    }

    /// Answer a ringing incoming call using its parked offer.
    pub async fn answer(&self, call_id: &str) -> ClientResult<()> {
        let mut state = self.inner.lock().await;
        let call = state
            .calls
            .get(call_id)
            .cloned()
            .ok_or_else(|| ClientError::call_not_found(call_id))?;
        let offer = state
            .peers
            .entry(call_id.to_string())
            .or_default()
            .pending_offer
            .take()
            .ok_or_else(|| ClientError::invalid_state("no pending offer for call"))?;
        self.answer_offer(&mut state, &call, offer).await
    }

    /// Switch the audio input. Live senders get the new track without a
    /// renegotiation.
    pub async fn set_media_source(&self, source: Arc<dyn MediaSource>) {
        *self.media.lock() = source.clone();
        let peers: Vec<Arc<dyn PeerTransport>> = {
            let state = self.inner.lock().await;
            state
                .peers
                .values()
                .filter_map(|slot| slot.peer.clone())
                .collect()
        };
        for peer in peers {
            if let Err(e) = peer.set_media(source.clone()).await {
                tracing::warn!(error = %e, "failed to switch audio source on live call");
            }
        }
    }

    /// React to one peer connection event.
    pub async fn handle_peer_event(&self, event: PeerEvent) {
        match event.kind {
            PeerEventKind::LocalCandidate(candidate) => {
                let call = {
                    let state = self.inner.lock().await;
                    state.calls.get(&event.call_id).cloned()
                };
                let Some(call) = call else { return };
                let message = outbound_signal(
                    &call,
                    SignalBody::Ice {
                        candidate: candidate.candidate,
                        sdp_mid: candidate.sdp_mid,
                        sdp_m_line_index: candidate.sdp_m_line_index,
                    },
                );
                if let Err(e) = self.client.send_signal(message).await {
                    // A lost candidate is tolerated; ICE keeps trying.
                    tracing::debug!(call_id = %event.call_id, error = %e, "candidate send failed");
                }
            }
            PeerEventKind::StateChanged(TransportState::Connected) => {
                if let Err(e) = self.client.mark_connected(&event.call_id).await {
                    tracing::warn!(call_id = %event.call_id, error = %e, "connected report failed");
                }
                self.handler.on_transport_connected(&event.call_id).await;
            }
            PeerEventKind::StateChanged(TransportState::Failed) => {
                self.handler.on_transport_failed(&event.call_id).await;
                if let Err(e) = self.client.end_call(&event.call_id).await {
                    tracing::warn!(call_id = %event.call_id, error = %e, "end request failed");
                }
            }
            PeerEventKind::StateChanged(TransportState::Closed) => {
                let last_peer_gone = {
                    let mut state = self.inner.lock().await;
                    state.peers.remove(&event.call_id);
                    state.peers.is_empty()
                };
                if last_peer_gone {
                    self.handler.on_remote_audio_cleared().await;
                }
            }
        }
    }

    async fn ensure_peer(
        &self,
        state: &mut ControllerState,
        call_id: &str,
    ) -> ClientResult<Arc<dyn PeerTransport>> {
        if let Some(peer) = state
            .peers
            .get(call_id)
            .and_then(|slot| slot.peer.clone())
        {
            return Ok(peer);
        }

        let peer = self.factory.create(call_id, self.events_tx.clone()).await?;
        let media = self.media.lock().clone();
        peer.set_media(media).await?;
        state.peers.entry(call_id.to_string()).or_default().peer = Some(peer.clone());
        Ok(peer)
    }

    async fn answer_offer(
        &self,
        state: &mut ControllerState,
        call: &BrowserCall,
        offer_sdp: String,
    ) -> ClientResult<()> {
        let peer = self.ensure_peer(state, &call.id).await?;
        let answer_sdp = peer.accept_offer(&offer_sdp).await?;
        self.flush_after_remote_description(state, &call.id, &peer)
            .await;

        self.client
            .send_signal(outbound_signal(call, SignalBody::Answer { sdp: answer_sdp }))
            .await
    }

    /// Flush queued candidates once the remote description is installed.
    /// The queue drains in arrival order and is then discarded; one bad
    /// candidate does not block the rest.
    async fn flush_after_remote_description(
        &self,
        state: &mut ControllerState,
        call_id: &str,
        peer: &Arc<dyn PeerTransport>,
    ) {
        let queued = {
            let slot = state.peers.entry(call_id.to_string()).or_default();
            slot.remote_described = true;
            std::mem::take(&mut slot.pending_ice)
        };
        for candidate in &queued {
            if let Err(e) = peer.add_remote_candidate(candidate).await {
                tracing::warn!(call_id, error = %e, "queued candidate rejected");
            }
        }
    }
}

fn outbound_signal(call: &BrowserCall, body: SignalBody) -> SignalMessage {
    SignalMessage {
        call_id: call.id.clone(),
        body,
        from_extension: call.local_extension.clone(),
        to_extension: call.remote_extension.clone(),
        sent_at_utc: Utc::now(),
    }
}

/// The local leg a signal belongs to: the newest non-terminal call whose
/// remote party is the signal's source extension.
fn resolve_local(state: &ControllerState, from_extension: &str) -> Option<BrowserCall> {
    state
        .calls
        .values()
        .filter(|c| !c.is_terminal() && c.remote_extension == from_extension)
        .max_by_key(|c| c.created_at_utc)
        .cloned()
}
