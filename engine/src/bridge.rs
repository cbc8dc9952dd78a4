//! Conflict dialog bridge: the request/response handshake with the
//! presentation layer.
//!
//! Each dialog is one suspended round trip keyed by a fresh session id. A
//! session resolves exactly once - by reply, by timeout, or by teardown - and
//! a late, duplicate, or unknown reply is logged and ignored rather than
//! re-resolved. A reply carrying a token that no longer matches the session's
//! expected token is forced to a cancellation: the UI must refresh before
//! retrying, never barge ahead on stale state.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use vellum_types::{
    ConflictMode, ConflictReply, ConflictRequest, FileResolution, FileStateSummary, SessionId,
    SnapshotToken,
};

/// How long a human gets to answer a conflict dialog before the requesting
/// call chain gives up and treats the session as cancelled.
pub const DEFAULT_DIALOG_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Transport seam to the presentation layer.
pub trait ConflictTransport: Send + Sync {
    fn send_request(&self, request: ConflictRequest);
}

/// Channel transport used by embeddings and tests.
impl ConflictTransport for mpsc::UnboundedSender<ConflictRequest> {
    fn send_request(&self, request: ConflictRequest) {
        if self.send(request).is_err() {
            warn!("Conflict request dropped: presentation channel closed");
        }
    }
}

/// The user's decision for one conflict session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Nothing may be mutated. Covers explicit cancellation, timeouts,
    /// teardown, and stale-token replies.
    Cancelled,
    /// Apply these per-file actions.
    Apply(Vec<FileResolution>),
}

impl ConflictResolution {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug)]
struct PendingSession {
    reply_tx: oneshot::Sender<ConflictResolution>,
    expected_token: SnapshotToken,
}

/// Correlation table of in-flight conflict dialogs.
#[derive(Debug)]
pub struct ConflictBridge {
    pending: Mutex<HashMap<SessionId, PendingSession>>,
    timeout: Duration,
}

impl ConflictBridge {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Number of dialogs currently awaiting a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending session lock").len()
    }

    /// Send one conflict request and suspend until it resolves.
    ///
    /// The caller's registry lock must not be held across this await: a
    /// human is on the other end.
    pub async fn show_conflict(
        &self,
        transport: &dyn ConflictTransport,
        mode: ConflictMode,
        files: Vec<FileStateSummary>,
        expected_token: SnapshotToken,
    ) -> ConflictResolution {
        let session_id = SessionId::generate();
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().expect("pending session lock");
            pending.insert(
                session_id,
                PendingSession {
                    reply_tx,
                    expected_token: expected_token.clone(),
                },
            );
        }

        debug!(%session_id, ?mode, files = files.len(), "Showing conflict dialog");
        transport.send_request(ConflictRequest {
            session_id,
            mode,
            files,
            snapshot_token: expected_token,
        });

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(resolution)) => resolution,
            // Sender dropped without a value: teardown already cancelled us.
            Ok(Err(_)) => ConflictResolution::Cancelled,
            Err(_) => {
                warn!(%session_id, "Conflict dialog timed out; treating as cancelled");
                self.pending
                    .lock()
                    .expect("pending session lock")
                    .remove(&session_id);
                ConflictResolution::Cancelled
            }
        }
    }

    /// Complete a pending session from a presentation-layer reply.
    ///
    /// Idempotent close: unknown or already-resolved session ids are ignored.
    pub fn handle_reply(&self, reply: ConflictReply) {
        let session = {
            let mut pending = self.pending.lock().expect("pending session lock");
            pending.remove(&reply.session_id)
        };
        let Some(session) = session else {
            warn!(
                session_id = %reply.session_id,
                "Ignoring reply for unknown or already-resolved conflict session"
            );
            return;
        };

        let resolution = if let Some(responded) = &reply.responded_token
            && *responded != session.expected_token
        {
            warn!(
                session_id = %reply.session_id,
                "Conflict reply carries a stale snapshot token; forcing cancellation"
            );
            ConflictResolution::Cancelled
        } else if reply.cancelled {
            ConflictResolution::Cancelled
        } else {
            ConflictResolution::Apply(reply.resolutions)
        };

        // The waiter may have timed out already; a failed send is fine.
        let _ = session.reply_tx.send(resolution);
    }

    /// Resolve every pending session as cancelled. Used on teardown so no
    /// caller hangs on a dialog forever.
    pub fn cancel_all(&self) {
        let drained: Vec<(SessionId, PendingSession)> = {
            let mut pending = self.pending.lock().expect("pending session lock");
            pending.drain().collect()
        };
        for (session_id, session) in drained {
            debug!(%session_id, "Cancelling pending conflict session on teardown");
            let _ = session.reply_tx.send(ConflictResolution::Cancelled);
        }
    }
}

impl Default for ConflictBridge {
    fn default() -> Self {
        Self::new(DEFAULT_DIALOG_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use vellum_types::{
        ConflictMode, ConflictReply, ConflictRequest, FileAction, FileResolution, SnapshotToken,
    };

    use super::{ConflictBridge, ConflictResolution};

    fn token(value: &str) -> SnapshotToken {
        SnapshotToken::from_digest(value.to_string())
    }

    /// Spawn one dialog and return the request the presentation layer saw
    /// plus the handle resolving to the dialog's outcome.
    fn spawn_dialog(
        bridge: &Arc<ConflictBridge>,
        mode: ConflictMode,
        expected: SnapshotToken,
    ) -> (
        mpsc::UnboundedReceiver<ConflictRequest>,
        tokio::task::JoinHandle<ConflictResolution>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = Arc::clone(bridge);
        let handle = tokio::spawn(async move {
            bridge.show_conflict(&tx, mode, Vec::new(), expected).await
        });
        (rx, handle)
    }

    #[tokio::test]
    async fn reply_with_matching_token_resolves_with_actions() {
        let bridge = Arc::new(ConflictBridge::new(Duration::from_secs(5)));
        let (mut rx, dialog) = spawn_dialog(&bridge, ConflictMode::PreSaveConflict, token("t0"));
        let request = rx.recv().await.expect("request");

        bridge.handle_reply(ConflictReply {
            session_id: request.session_id,
            cancelled: false,
            resolutions: vec![FileResolution {
                path: "/doc/notes.md".to_string(),
                action: FileAction::OverwriteWithExternalBackup,
            }],
            responded_token: Some(token("t0")),
        });

        match dialog.await.expect("dialog task") {
            ConflictResolution::Apply(resolutions) => {
                assert_eq!(resolutions.len(), 1);
                assert_eq!(
                    resolutions[0].action,
                    FileAction::OverwriteWithExternalBackup
                );
            }
            ConflictResolution::Cancelled => panic!("expected an applied resolution"),
        }
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn stale_responded_token_forces_cancellation() {
        let bridge = Arc::new(ConflictBridge::new(Duration::from_secs(5)));
        let (mut rx, dialog) = spawn_dialog(&bridge, ConflictMode::PreSaveConflict, token("t0"));
        let request = rx.recv().await.expect("request");

        bridge.handle_reply(ConflictReply {
            session_id: request.session_id,
            cancelled: false,
            resolutions: vec![FileResolution {
                path: "/doc/notes.md".to_string(),
                action: FileAction::Overwrite,
            }],
            responded_token: Some(token("t1-stale")),
        });

        assert!(dialog.await.expect("dialog task").is_cancelled());
    }

    #[tokio::test]
    async fn duplicate_replies_are_ignored() {
        let bridge = Arc::new(ConflictBridge::new(Duration::from_secs(5)));
        let (mut rx, dialog) = spawn_dialog(&bridge, ConflictMode::ReloadRequest, token("t0"));
        let request = rx.recv().await.expect("request");

        let reply = ConflictReply {
            session_id: request.session_id,
            cancelled: true,
            resolutions: Vec::new(),
            responded_token: None,
        };
        bridge.handle_reply(reply.clone());
        // Second close of the same session id must be a no-op.
        bridge.handle_reply(reply);

        assert!(dialog.await.expect("dialog task").is_cancelled());
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn reply_for_unknown_session_is_ignored() {
        let bridge = ConflictBridge::new(Duration::from_secs(5));
        bridge.handle_reply(ConflictReply {
            session_id: vellum_types::SessionId::generate(),
            cancelled: false,
            resolutions: Vec::new(),
            responded_token: None,
        });
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn timeout_resolves_as_cancelled_and_clears_the_session() {
        let bridge = ConflictBridge::new(Duration::from_millis(20));
        let (tx, _rx) = mpsc::unbounded_channel();

        let resolution = bridge
            .show_conflict(&tx, ConflictMode::ExternalChangeReview, Vec::new(), token("t0"))
            .await;

        assert!(resolution.is_cancelled());
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancel_all_resolves_every_pending_session() {
        let bridge = Arc::new(ConflictBridge::new(Duration::from_secs(5)));
        let (mut rx_a, first) = spawn_dialog(&bridge, ConflictMode::PreSaveConflict, token("a"));
        let (mut rx_b, second) = spawn_dialog(&bridge, ConflictMode::ReloadRequest, token("b"));

        // Both requests observable means both sessions are registered.
        let _ = rx_a.recv().await.expect("first request");
        let _ = rx_b.recv().await.expect("second request");
        assert_eq!(bridge.pending_count(), 2);

        bridge.cancel_all();
        assert!(first.await.expect("first dialog").is_cancelled());
        assert!(second.await.expect("second dialog").is_cancelled());
        assert_eq!(bridge.pending_count(), 0);
    }
}
