//! Reservation data for a single player identity

use crate::scheduler::TaskId;
use std::sync::Mutex;

/// Expiry bookkeeping for a ticket.
///
/// `Scheduled(None)` is a live ticket with no timed expiry (an unlimited
/// grant), `Scheduled(Some(_))` is live with a pending expiry task, and
/// `Invalidated` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpiryState {
    Scheduled(Option<TaskId>),
    Invalidated,
}

/// A reserved re-entry slot for one player.
///
/// Created and transitioned only by the `TicketRegistry`. Listeners receive
/// shared references and may hold one after the ticket left the registry map;
/// by then `is_valid` already reports false.
#[derive(Debug)]
pub struct Ticket {
    player_uid: String,
    expiry: Mutex<ExpiryState>,
}

impl Ticket {
    pub(crate) fn new(player_uid: &str) -> Self {
        Self {
            player_uid: player_uid.to_string(),
            expiry: Mutex::new(ExpiryState::Scheduled(None)),
        }
    }

    /// The player identity this reservation belongs to.
    pub fn player_uid(&self) -> &str {
        &self.player_uid
    }

    /// Whether the ticket can still be consumed.
    pub fn is_valid(&self) -> bool {
        matches!(*self.expiry.lock().unwrap(), ExpiryState::Scheduled(_))
    }

    /// Attaches the pending expiry task to a live ticket.
    pub(crate) fn arm(&self, task: TaskId) {
        let mut state = self.expiry.lock().unwrap();
        if *state == ExpiryState::Scheduled(None) {
            *state = ExpiryState::Scheduled(Some(task));
        }
    }

    /// Transitions to `Invalidated`.
    ///
    /// Returns `None` when the ticket was already invalidated, otherwise the
    /// expiry task (if any) the caller must cancel. The transition happens
    /// exactly once, which is what makes double invalidation a no-op.
    pub(crate) fn disarm(&self) -> Option<Option<TaskId>> {
        let mut state = self.expiry.lock().unwrap();
        match *state {
            ExpiryState::Invalidated => None,
            ExpiryState::Scheduled(task) => {
                *state = ExpiryState::Invalidated;
                Some(task)
            }
        }
    }
}
