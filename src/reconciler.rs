//! Admission policy: wires disconnect classification to ticket issuance and
//! ticket lifecycle to queue movement
//!
//! Three wires, mirroring the flow of a reserved slot:
//! - classified disconnect → TTL policy → ticket issuance
//! - ticket issued → pull a matching already-queued client straight through
//! - ticket invalidated (consumed, expired, or cleared) → backfill the freed
//!   capacity from the head of the wait-queue

use crate::classifier::{DisconnectCause, DisconnectClassifier, DisconnectEvent};
use crate::config::Timings;
use crate::host::{CapacitySource, FinalizeSink};
use crate::queue::WaitQueue;
use crate::registry::{TicketRegistry, Ttl};
use crate::ticket::Ticket;
use log::{debug, info};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Maps a classified disconnect to a ticket lifetime. Zero disables tickets
/// for that cause.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    pub quit: Duration,
    pub crash: Duration,
    pub timeout: Duration,
    pub failed_join: Duration,
}

impl TtlPolicy {
    pub fn from_timings(timings: &Timings) -> Self {
        Self {
            quit: Duration::from_secs_f64(timings.quit_ticket_ttl_seconds),
            crash: Duration::from_secs_f64(timings.crash_ticket_ttl_seconds),
            timeout: Duration::from_secs_f64(timings.timeout_ticket_ttl_seconds),
            failed_join: Duration::from_secs_f64(timings.failed_join_ticket_ttl_seconds),
        }
    }

    /// The ticket lifetime for this disconnect, or `None` when no ticket
    /// should be issued.
    pub fn ticket_ttl(&self, event: &DisconnectEvent) -> Option<Duration> {
        let base = match event.cause {
            DisconnectCause::Quit => self.quit,
            DisconnectCause::Crash => self.crash,
            DisconnectCause::Timeout => self.timeout,
            // No bypass ticket for kicks.
            DisconnectCause::Kicked => return None,
        };
        // A failed join always gets at least the failed-join grace period,
        // but a longer cause-specific TTL still wins.
        let ttl = if event.was_failed_join {
            base.max(self.failed_join)
        } else {
            base
        };
        if ttl.is_zero() {
            None
        } else {
            Some(ttl)
        }
    }
}

/// Admission policy around the wait-queue.
///
/// Construction subscribes the reconciler to the classifier's disconnect
/// events and the registry's ticket notifications; everything else is driven
/// by those and by the host calling the `handle_*`/`try_bypass` entry points.
pub struct AdmissionReconciler {
    registry: Arc<TicketRegistry>,
    classifier: Arc<DisconnectClassifier>,
    queue: Arc<dyn WaitQueue>,
    capacity: Arc<dyn CapacitySource>,
    finalizer: Arc<dyn FinalizeSink>,
    policy: TtlPolicy,
}

impl AdmissionReconciler {
    pub fn new(
        registry: Arc<TicketRegistry>,
        classifier: Arc<DisconnectClassifier>,
        queue: Arc<dyn WaitQueue>,
        capacity: Arc<dyn CapacitySource>,
        finalizer: Arc<dyn FinalizeSink>,
        policy: TtlPolicy,
    ) -> Arc<Self> {
        let reconciler = Arc::new(Self {
            registry,
            classifier,
            queue,
            capacity,
            finalizer,
            policy,
        });

        let weak: Weak<Self> = Arc::downgrade(&reconciler);
        reconciler.classifier.on_client_disconnect(move |event| {
            if let Some(reconciler) = weak.upgrade() {
                reconciler.handle_disconnect_event(event);
            }
        });

        let weak = Arc::downgrade(&reconciler);
        reconciler.registry.on_ticket_issued(move |ticket| {
            if let Some(reconciler) = weak.upgrade() {
                reconciler.handle_ticket_issued(ticket);
            }
        });

        let weak = Arc::downgrade(&reconciler);
        reconciler.registry.on_ticket_invalidated(move |_| {
            if let Some(reconciler) = weak.upgrade() {
                reconciler.backfill_from_queue();
            }
        });

        reconciler
    }

    /// Consuming bypass check for a client requesting entry while the server
    /// is full. True means admit unconditionally; false falls through to the
    /// host's normal queue and capacity logic.
    pub fn try_bypass(&self, player_uid: &str) -> bool {
        self.registry.has_bypass_ticket(player_uid, true)
    }

    /// Forwarded by the host when a connection is fully accepted.
    pub fn handle_client_accepted(&self, connection_id: u32) {
        self.classifier.handle_client_accepted(connection_id);
    }

    /// Forwarded by the host when a connection drops, with whatever reason
    /// text the transport reported.
    pub fn handle_client_disconnect(
        &self,
        connection_id: u32,
        player_uid: &str,
        server_reason: Option<&str>,
        client_reason: Option<&str>,
    ) {
        self.classifier
            .handle_client_disconnect(connection_id, player_uid, server_reason, client_reason);
    }

    /// Capacity not claimed by live players or outstanding reservations.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity
            .total_capacity()
            .saturating_sub(self.capacity.population())
            .saturating_sub(self.registry.active_ticket_count())
    }

    /// Silently clears all admission state. Called when this policy becomes
    /// the active queue handler.
    pub fn attach(&self) {
        self.reset();
    }

    /// Silently clears all admission state. Called when this policy stops
    /// being the active queue handler.
    pub fn detach(&self) {
        self.reset();
    }

    pub fn reset(&self) {
        self.registry.reset();
        self.classifier.reset();
    }

    fn handle_disconnect_event(&self, event: &DisconnectEvent) {
        let ttl = match self.policy.ticket_ttl(event) {
            Some(ttl) => ttl,
            None => {
                debug!(
                    "No bypass ticket for player {} (cause {:?})",
                    event.player_uid, event.cause
                );
                return;
            }
        };
        self.registry.issue_ticket(&event.player_uid, Ttl::After(ttl));
    }

    fn handle_ticket_issued(&self, ticket: &Arc<Ticket>) {
        // The player may already be back in the queue; pull them straight
        // through instead of making them wait for the next admission pass.
        if let Some(client) = self.queue.remove_by_id(ticket.player_uid()) {
            info!(
                "Player {} was already queued, admitting directly",
                client.player_uid
            );
            self.registry.invalidate_ticket(ticket);
            self.finalizer.finalize_join(client);
        }
    }

    fn backfill_from_queue(&self) {
        // Capacity is computed once so the loop stays bounded even if
        // concurrent invalidations change the numbers mid-backfill.
        let mut remaining = self.remaining_capacity();
        while remaining > 0 {
            let client = match self.queue.remove_next() {
                Some(client) => client,
                None => break,
            };
            info!(
                "Backfilling freed capacity with queued player {}",
                client.player_uid
            );
            self.finalizer.finalize_join(client);
            remaining -= 1;
        }
    }
}
