//! State machine and signal relay for browser-native calls.
//!
//! The orchestrator owns every [`BrowserCall`] in the process. Lookups are
//! lock-free; a status transition is applied under the entry's own lock, so
//! a reject racing an answer resolves to whichever committed first and the
//! loser observes a no-op instead of an error.
//!
//! A call attempt produces one leg per party. Ending one leg cascades to
//! the counterpart leg - matched by complementary extensions - so a call is
//! never left silently orphaned on one side.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;

use crate::browser::call::{BrowserCall, end_reason};
use crate::browser::signal::SignalMessage;
use crate::cdr::{CallDetailRecord, CdrKind, CdrSink};
use crate::errors::{CoreError, CoreResult};
use crate::notifier::SessionNotifier;
use crate::registry::SessionRegistry;
use crate::session::Session;

const DEFAULT_ENDED_RETENTION: Duration = Duration::from_secs(30);

/// Orchestrates browser call legs and relays signaling between them.
pub struct BrowserCallOrchestrator {
    calls: DashMap<String, BrowserCall>,
    registry: Arc<SessionRegistry>,
    notifier: Arc<dyn SessionNotifier>,
    cdr: Arc<dyn CdrSink>,
    ended_retention: Duration,
}

impl BrowserCallOrchestrator {
    /// Create an orchestrator over the given session registry.
    pub fn new(
        registry: Arc<SessionRegistry>,
        notifier: Arc<dyn SessionNotifier>,
        cdr: Arc<dyn CdrSink>,
    ) -> Self {
        Self {
            calls: DashMap::new(),
            registry,
            notifier,
            cdr,
            ended_retention: DEFAULT_ENDED_RETENTION,
        }
    }

    /// Override how long ended legs are retained for client reconciliation.
    pub fn with_ended_retention(mut self, retention: Duration) -> Self {
        self.ended_retention = retention;
        self
    }

    /// Place a browser call from the session's selected extension.
    ///
    /// Creates the caller's leg in `Ringing` and, when another session
    /// currently owns the destination extension, the callee's incoming leg
    /// as well. The caller's transition to `Connected` is driven later by
    /// its peer-connection-state callback through [`Self::mark_connected`].
    pub async fn place_call(
        &self,
        session: &Arc<Session>,
        destination: &str,
    ) -> CoreResult<BrowserCall> {
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(CoreError::bad_request("destination must not be empty"));
        }

        let local_extension = {
            let state = session.gate().await;
            state
                .selected_extension
                .clone()
                .ok_or_else(|| CoreError::bad_request("no extension selected"))?
        };
        if destination == local_extension {
            return Err(CoreError::bad_request("cannot call own extension"));
        }

        let caller_leg =
            BrowserCall::outgoing(&session.session_id, &local_extension, destination);
        self.calls.insert(caller_leg.id.clone(), caller_leg.clone());
        self.notifier
            .push_browser_call(&session.session_id, &caller_leg)
            .await;

        if let Some(callee) = self.registry.find_by_extension(destination) {
            if callee.session_id != session.session_id {
                let callee_leg = BrowserCall::incoming(
                    &callee.session_id,
                    destination,
                    &local_extension,
                    Some(session.username.clone()),
                );
                self.calls.insert(callee_leg.id.clone(), callee_leg.clone());
                self.notifier
                    .push_browser_call(&callee.session_id, &callee_leg)
                    .await;
            }
        } else {
            tracing::debug!(
                destination,
                "no session owns the destination extension; caller rings unanswered"
            );
        }

        Ok(caller_leg)
    }

    /// Accept a ringing incoming leg.
    ///
    /// Idempotent-guarded: a second invocation on a non-`Ringing` leg is a
    /// no-op, so repeated client retries are safe.
    pub async fn answer_call(&self, session: &Arc<Session>, call_id: &str) -> CoreResult<()> {
        let updated = {
            let mut entry = self
                .calls
                .get_mut(call_id)
                .ok_or_else(|| CoreError::not_found(format!("unknown call {}", call_id)))?;
            if entry.session_id != session.session_id {
                return Err(CoreError::forbidden("call is not owned by this session"));
            }
            if entry.begin_connecting() {
                Some(entry.clone())
            } else {
                None
            }
        };

        if let Some(call) = updated {
            self.notifier
                .push_browser_call(&call.session_id, &call)
                .await;
        }
        Ok(())
    }

    /// Reject a leg while it rings. Ends the counterpart leg too.
    pub async fn reject_call(&self, session: &Arc<Session>, call_id: &str) -> CoreResult<()> {
        self.end_owned(session, call_id, end_reason::REJECTED).await
    }

    /// Hang up a leg in any non-terminal state. Ends the counterpart leg
    /// too.
    pub async fn end_call(&self, session: &Arc<Session>, call_id: &str) -> CoreResult<()> {
        self.end_owned(session, call_id, end_reason::ENDED).await
    }

    /// Record that a party's peer transport reached `connected`.
    ///
    /// First report wins; duplicates and reports for unknown (possibly
    /// just pruned) legs are no-ops.
    pub async fn mark_connected(&self, session: &Arc<Session>, call_id: &str) -> CoreResult<()> {
        let updated = {
            match self.calls.get_mut(call_id) {
                None => None,
                Some(mut entry) => {
                    if entry.session_id != session.session_id {
                        tracing::debug!(call_id, "connected report from a non-party session");
                        None
                    } else if entry.mark_connected() {
                        Some(entry.clone())
                    } else {
                        None
                    }
                }
            }
        };

        if let Some(call) = updated {
            self.notifier
                .push_browser_call(&call.session_id, &call)
                .await;
        }
        Ok(())
    }

    /// Relay a signal to the opposite party of the sender's leg.
    ///
    /// A pure pipe: the payload is validated structurally, then pushed
    /// unmodified. An unknown call id or a missing destination session is
    /// a silent no-op - the call may have just ended, and a single lost
    /// signal is tolerated by ICE restart on the client side.
    pub async fn forward_signal(
        &self,
        from_session: &Arc<Session>,
        message: SignalMessage,
    ) -> CoreResult<()> {
        message.validate()?;

        let Some(call) = self.calls.get(&message.call_id).map(|c| c.clone()) else {
            tracing::debug!(call_id = %message.call_id, "dropping signal for unknown call");
            return Ok(());
        };
        if call.session_id != from_session.session_id {
            tracing::debug!(call_id = %message.call_id, "dropping signal from a non-party session");
            return Ok(());
        }

        let Some(destination) = self.registry.find_by_extension(&call.remote_extension) else {
            tracing::debug!(
                call_id = %message.call_id,
                remote = %call.remote_extension,
                "dropping signal; no session owns the remote extension"
            );
            return Ok(());
        };

        self.notifier
            .push_signal(&destination.session_id, &message)
            .await;
        Ok(())
    }

    /// Force down every leg the disconnected session is party to and
    /// notify the counterparts so their peer connections are torn down.
    pub async fn handle_session_disconnected(&self, session_id: &str) {
        let ids: Vec<String> = self
            .calls
            .iter()
            .filter(|c| c.session_id == session_id && !c.is_terminal())
            .map(|c| c.id.clone())
            .collect();

        for id in ids {
            self.end_cascade(&id, end_reason::SESSION_DISCONNECTED).await;
        }
    }

    /// Legs owned by a session, oldest first. Used to seed a freshly
    /// connected client.
    pub fn calls_for_session(&self, session_id: &str) -> Vec<BrowserCall> {
        let mut calls: Vec<BrowserCall> = self
            .calls
            .iter()
            .filter(|c| c.session_id == session_id)
            .map(|c| c.clone())
            .collect();
        calls.sort_by_key(|c| c.created_at_utc);
        calls
    }

    /// Look up one leg.
    pub fn get(&self, call_id: &str) -> Option<BrowserCall> {
        self.calls.get(call_id).map(|c| c.clone())
    }

    /// Drop ended legs older than the retention window.
    pub fn prune_ended(&self) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.ended_retention)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));
        self.calls
            .retain(|_, call| match (call.is_terminal(), call.ended_at_utc) {
                (true, Some(ended_at)) => ended_at > cutoff,
                _ => true,
            });
    }

    async fn end_owned(
        &self,
        session: &Arc<Session>,
        call_id: &str,
        reason: &str,
    ) -> CoreResult<()> {
        {
            let entry = self
                .calls
                .get(call_id)
                .ok_or_else(|| CoreError::not_found(format!("unknown call {}", call_id)))?;
            if entry.session_id != session.session_id {
                return Err(CoreError::forbidden("call is not owned by this session"));
            }
            if entry.is_terminal() {
                return Ok(());
            }
        }
        self.end_cascade(call_id, reason).await;
        Ok(())
    }

    async fn end_cascade(&self, call_id: &str, reason: &str) {
        let Some(ended) = self.end_single(call_id, reason).await else {
            return;
        };
        if let Some(counterpart_id) = self.find_counterpart(&ended) {
            self.end_single(&counterpart_id, reason).await;
        }
    }

    async fn end_single(&self, call_id: &str, reason: &str) -> Option<BrowserCall> {
        let ended = {
            let mut entry = self.calls.get_mut(call_id)?;
            if entry.end(reason) {
                Some(entry.clone())
            } else {
                None
            }
        };

        if let Some(call) = &ended {
            self.notifier
                .push_browser_call(&call.session_id, call)
                .await;
            self.cdr
                .write(&CallDetailRecord {
                    call_id: call.id.clone(),
                    kind: CdrKind::Browser,
                    from_extension: call.local_extension.clone(),
                    to_extension: call.remote_extension.clone(),
                    started_at: call.created_at_utc,
                    answered_at: call.answered_at_utc,
                    ended_at: call.ended_at_utc.unwrap_or_else(Utc::now),
                    end_reason: call.end_reason.clone(),
                })
                .await;
        }
        ended
    }

    fn find_counterpart(&self, call: &BrowserCall) -> Option<String> {
        self.calls
            .iter()
            .find(|c| {
                c.id != call.id
                    && c.session_id != call.session_id
                    && !c.is_terminal()
                    && c.local_extension == call.remote_extension
                    && c.remote_extension == call.local_extension
            })
            .map(|c| c.id.clone())
    }
}
