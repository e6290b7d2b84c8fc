//! Disconnect cause classification and failed-join detection
//!
//! The transport only reports free-text disconnect reasons, so turning a raw
//! disconnect into "they crashed" versus "they quit" is pattern matching over
//! known phrases: a best-effort heuristic, not a guaranteed classification.
//! The rules are evaluated top to bottom and the ordering matters (the crash
//! phrases win over everything else).

use crate::events::ListenerSet;
use log::debug;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Reason text reported when a client died with an exception.
const REASON_THREW_EXCEPTION: &str = "Threw an exception at the server";
/// Localized variant of the crash reason.
const REASON_CLIENT_CRASHED: &str = "The Players client crashed";
/// Ambiguous between a timeout and a silently closed window; treated as a
/// timeout.
const REASON_LOST_CONNECTION_DISCONNECTED: &str = "Lost connection/disconnected";
/// Distinct from the variant above, though the upstream semantics are
/// unclear. Mapped to a kick, preserved as-is.
const REASON_LOST_CONNECTION: &str = "Lost connection";

/// Best-effort semantic cause of a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    Quit,
    Kicked,
    Crash,
    Timeout,
}

/// One classified disconnect, produced per disconnect call and consumed
/// synchronously by subscribers. Not stored anywhere.
#[derive(Debug, Clone)]
pub struct DisconnectEvent {
    pub connection_id: u32,
    pub player_uid: String,
    pub was_failed_join: bool,
    pub cause: DisconnectCause,
}

/// Tracks accepted-at timestamps per connection and classifies disconnects.
pub struct DisconnectClassifier {
    /// When each connection was fully accepted into the game. Entries exist
    /// only between accept and disconnect.
    accepted_at: Mutex<HashMap<u32, Instant>>,
    /// Sessions shorter than this count as failed joins.
    failed_join_threshold: Duration,
    on_disconnect: ListenerSet<DisconnectEvent>,
}

impl DisconnectClassifier {
    pub fn new(failed_join_threshold: Duration) -> Self {
        Self {
            accepted_at: Mutex::new(HashMap::new()),
            failed_join_threshold,
            on_disconnect: ListenerSet::new(),
        }
    }

    pub fn on_client_disconnect<F>(&self, listener: F)
    where
        F: Fn(&DisconnectEvent) + Send + Sync + 'static,
    {
        self.on_disconnect.subscribe(listener);
    }

    /// Records when the connection was fully accepted into the game.
    pub fn handle_client_accepted(&self, connection_id: u32) {
        self.accepted_at
            .lock()
            .unwrap()
            .entry(connection_id)
            .or_insert_with(Instant::now);
    }

    /// Classifies a disconnect, emits the event to subscribers, and returns
    /// it.
    ///
    /// A connection with no accepted-at record was never fully accepted and
    /// is not a failed join; it never joined in the first place.
    pub fn handle_client_disconnect(
        &self,
        connection_id: u32,
        player_uid: &str,
        server_reason: Option<&str>,
        client_reason: Option<&str>,
    ) -> DisconnectEvent {
        let was_failed_join = self
            .accepted_at
            .lock()
            .unwrap()
            .remove(&connection_id)
            .map_or(false, |accepted| accepted.elapsed() < self.failed_join_threshold);

        let cause = classify(server_reason, client_reason);
        let event = DisconnectEvent {
            connection_id,
            player_uid: player_uid.to_string(),
            was_failed_join,
            cause,
        };
        debug!(
            "Connection {} (player {}) disconnected: cause {:?}, failed join: {}",
            connection_id, player_uid, cause, was_failed_join
        );
        self.on_disconnect.emit(&event);
        event
    }

    /// Forgets every accepted-at record.
    pub fn reset(&self) {
        self.accepted_at.lock().unwrap().clear();
    }
}

/// Ordered exact-match rules over the server-side reason text.
fn classify(server_reason: Option<&str>, client_reason: Option<&str>) -> DisconnectCause {
    match server_reason {
        Some(REASON_THREW_EXCEPTION) | Some(REASON_CLIENT_CRASHED) => DisconnectCause::Crash,
        Some(REASON_LOST_CONNECTION_DISCONNECTED) => DisconnectCause::Timeout,
        Some(REASON_LOST_CONNECTION) => DisconnectCause::Kicked,
        other => {
            let server_silent = other.map_or(true, str::is_empty);
            let client_silent = client_reason.map_or(true, str::is_empty);
            if server_silent && client_silent {
                DisconnectCause::Quit
            } else {
                DisconnectCause::Kicked
            }
        }
    }
}
