//! Bypass ticket issuance, lookup, and expiry for the admission queue
//!
//! This module owns the player → active reservation mapping, including:
//! - Atomic check-and-consume of tickets during admission
//! - Supersession when a player who already holds a ticket gets a new one
//! - TTL-based expiry through a cancellable scheduler task per ticket
//! - Issuance and invalidation notifications for the admission policy
//!
//! The registry is the authority on ticket validity: no other component
//! mutates a ticket, and at most one valid ticket exists per player at any
//! observed instant.

use crate::events::ListenerSet;
use crate::scheduler::Scheduler;
use crate::ticket::Ticket;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// How long an issued ticket stays consumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Expires after the given duration. A zero duration means already
    /// expired: the ticket is issued and immediately invalidated.
    After(Duration),
    /// Never expires on its own; lives until explicitly invalidated.
    Unlimited,
}

/// A notification collected inside a critical section, delivered after the
/// registry lock is released.
enum Notice {
    Issued(Arc<Ticket>),
    Invalidated(Arc<Ticket>),
}

/// Owns the mapping from player identity to at most one live [`Ticket`].
///
/// Every operation runs under one internal lock, so no caller can observe a
/// partially updated ticket. Notifications are collected during the critical
/// section and delivered in order after the lock drops, which lets listeners
/// call straight back into the registry (the admission policy consumes and
/// issues tickets from inside its listeners) without deadlocking.
pub struct TicketRegistry {
    tickets: Mutex<HashMap<String, Arc<Ticket>>>,
    scheduler: Arc<dyn Scheduler>,
    /// Handle to ourselves for the expiry tasks; they outlive any one borrow
    /// of the registry but must not keep it alive.
    self_ref: Weak<TicketRegistry>,
    on_issued: ListenerSet<Arc<Ticket>>,
    on_invalidated: ListenerSet<Arc<Ticket>>,
}

impl TicketRegistry {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            tickets: Mutex::new(HashMap::new()),
            scheduler,
            self_ref: weak.clone(),
            on_issued: ListenerSet::new(),
            on_invalidated: ListenerSet::new(),
        })
    }

    /// Subscribes to tickets becoming live. By the time this fires, the
    /// ticket is stored and its expiry is scheduled, so a listener may
    /// consume it immediately.
    pub fn on_ticket_issued<F>(&self, listener: F)
    where
        F: Fn(&Arc<Ticket>) + Send + Sync + 'static,
    {
        self.on_issued.subscribe(listener);
    }

    /// Subscribes to tickets becoming invalid, whether consumed, expired, or
    /// explicitly cleared. Fires exactly once per ticket lifetime.
    pub fn on_ticket_invalidated<F>(&self, listener: F)
    where
        F: Fn(&Arc<Ticket>) + Send + Sync + 'static,
    {
        self.on_invalidated.subscribe(listener);
    }

    /// Returns whether `player_uid` holds a valid ticket.
    ///
    /// With `consume_if_valid`, a valid ticket is invalidated atomically with
    /// the check: once this returns true, no other thread can observe the
    /// ticket as still valid. Without it, this is a pure query.
    pub fn has_bypass_ticket(&self, player_uid: &str, consume_if_valid: bool) -> bool {
        let mut notices = Vec::new();
        let found = {
            let mut tickets = self.tickets.lock().unwrap();
            match tickets.get(player_uid).cloned() {
                Some(ticket) if ticket.is_valid() => {
                    if consume_if_valid {
                        info!("Consuming bypass ticket for player {}", player_uid);
                        self.invalidate_locked(&mut tickets, &ticket, &mut notices);
                    }
                    true
                }
                _ => false,
            }
        };
        self.deliver(notices);
        found
    }

    /// Issues a fresh ticket for `player_uid`, superseding any existing one.
    ///
    /// The superseded ticket's invalidation notice is delivered before the
    /// new ticket's issued notice. Expiry is scheduled and the ticket stored
    /// before anything is emitted.
    pub fn issue_ticket(&self, player_uid: &str, ttl: Ttl) {
        let ticket = Arc::new(Ticket::new(player_uid));
        let expire_now = ttl == Ttl::After(Duration::ZERO);
        let mut notices = Vec::new();
        {
            let mut tickets = self.tickets.lock().unwrap();
            if let Some(old) = tickets.get(player_uid).cloned() {
                debug!("Superseding existing bypass ticket for player {}", player_uid);
                self.invalidate_locked(&mut tickets, &old, &mut notices);
            }

            match ttl {
                Ttl::After(delay) if !delay.is_zero() => {
                    let registry = self.self_ref.clone();
                    let expiring = Arc::clone(&ticket);
                    let task = self.scheduler.schedule_once(
                        delay,
                        Box::new(move || {
                            if let Some(registry) = registry.upgrade() {
                                debug!(
                                    "Bypass ticket for player {} reached its TTL",
                                    expiring.player_uid()
                                );
                                registry.invalidate_ticket(&expiring);
                            }
                        }),
                    );
                    ticket.arm(task);
                    info!(
                        "Bypass ticket issued for player {} (expires in {:?})",
                        player_uid, delay
                    );
                }
                Ttl::After(_) => {
                    // Callers normally filter out non-positive TTLs; a zero
                    // that slips through is treated as already expired.
                    info!("Bypass ticket issued for player {} with zero TTL", player_uid);
                }
                Ttl::Unlimited => {
                    info!("Bypass ticket issued for player {} (no expiry)", player_uid);
                }
            }

            tickets.insert(player_uid.to_string(), Arc::clone(&ticket));
            notices.push(Notice::Issued(Arc::clone(&ticket)));
        }
        self.deliver(notices);

        if expire_now {
            self.invalidate_ticket(&ticket);
        }
    }

    /// Invalidates the active ticket for `player_uid`, if any.
    pub fn invalidate_all_tickets_by_player(&self, player_uid: &str) {
        let mut notices = Vec::new();
        {
            let mut tickets = self.tickets.lock().unwrap();
            if let Some(ticket) = tickets.get(player_uid).cloned() {
                self.invalidate_locked(&mut tickets, &ticket, &mut notices);
            }
        }
        self.deliver(notices);
    }

    /// Invalidates `ticket` if it is still valid.
    ///
    /// Idempotent: a second call on the same ticket changes nothing and emits
    /// nothing. This also absorbs the race between an expiry task firing and
    /// a concurrent explicit invalidation.
    pub fn invalidate_ticket(&self, ticket: &Arc<Ticket>) {
        let mut notices = Vec::new();
        {
            let mut tickets = self.tickets.lock().unwrap();
            self.invalidate_locked(&mut tickets, ticket, &mut notices);
        }
        self.deliver(notices);
    }

    /// Drops every ticket and cancels every pending expiry without emitting
    /// invalidation notices.
    ///
    /// Used at subsystem attach/detach, where per-ticket cascading backfill
    /// is not wanted. A late expiry task firing after reset finds its ticket
    /// already invalidated and does nothing.
    pub fn reset(&self) {
        let count;
        {
            let mut tickets = self.tickets.lock().unwrap();
            count = tickets.len();
            for ticket in tickets.values() {
                if let Some(Some(task)) = ticket.disarm() {
                    self.scheduler.cancel(task);
                }
            }
            tickets.clear();
        }
        if count > 0 {
            info!("Cleared {} bypass ticket(s)", count);
        }
    }

    /// Number of currently live tickets.
    pub fn active_ticket_count(&self) -> usize {
        self.tickets.lock().unwrap().len()
    }

    /// Snapshot of the current ticket holders.
    pub fn players_with_ticket(&self) -> Vec<Arc<Ticket>> {
        self.tickets.lock().unwrap().values().cloned().collect()
    }

    /// Invalidation under the registry lock. Pushes a notice only when this
    /// call performed the transition.
    fn invalidate_locked(
        &self,
        tickets: &mut HashMap<String, Arc<Ticket>>,
        ticket: &Arc<Ticket>,
        notices: &mut Vec<Notice>,
    ) {
        let task = match ticket.disarm() {
            Some(task) => task,
            // Already invalidated.
            None => return,
        };
        if let Some(task) = task {
            self.scheduler.cancel(task);
        }

        // Remove the entry only if it is still this exact ticket; a newer
        // ticket may have superseded it in the meantime.
        let still_held = tickets
            .get(ticket.player_uid())
            .map_or(false, |held| Arc::ptr_eq(held, ticket));
        if still_held {
            tickets.remove(ticket.player_uid());
        }

        info!("Invalidated bypass ticket for player {}", ticket.player_uid());
        notices.push(Notice::Invalidated(Arc::clone(ticket)));
    }

    fn deliver(&self, notices: Vec<Notice>) {
        for notice in notices {
            match notice {
                Notice::Issued(ticket) => self.on_issued.emit(&ticket),
                Notice::Invalidated(ticket) => self.on_invalidated.emit(&ticket),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry_with_scheduler() -> (Arc<TicketRegistry>, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let registry = TicketRegistry::new(Arc::clone(&scheduler) as Arc<dyn Scheduler>);
        (registry, scheduler)
    }

    #[test]
    fn test_consume_succeeds_exactly_once() {
        let (registry, _scheduler) = registry_with_scheduler();
        registry.issue_ticket("alice", Ttl::After(Duration::from_secs(30)));

        assert!(registry.has_bypass_ticket("alice", true));
        assert!(!registry.has_bypass_ticket("alice", true));
        assert_eq!(registry.active_ticket_count(), 0);
    }

    #[test]
    fn test_query_without_consuming_leaves_ticket() {
        let (registry, _scheduler) = registry_with_scheduler();
        registry.issue_ticket("alice", Ttl::After(Duration::from_secs(30)));

        assert!(registry.has_bypass_ticket("alice", false));
        assert!(registry.has_bypass_ticket("alice", false));
        assert_eq!(registry.active_ticket_count(), 1);
    }

    #[test]
    fn test_unknown_player_has_no_ticket() {
        let (registry, _scheduler) = registry_with_scheduler();
        assert!(!registry.has_bypass_ticket("nobody", true));
    }

    #[test]
    fn test_reissue_supersedes_old_ticket() {
        let (registry, scheduler) = registry_with_scheduler();
        registry.issue_ticket("alice", Ttl::After(Duration::from_secs(30)));
        let old = registry.players_with_ticket().pop().unwrap();

        registry.issue_ticket("alice", Ttl::After(Duration::from_secs(60)));

        assert_eq!(registry.active_ticket_count(), 1);
        assert!(!old.is_valid());
        let current = registry.players_with_ticket().pop().unwrap();
        assert!(current.is_valid());
        assert!(!Arc::ptr_eq(&old, &current));
        // The superseded ticket's expiry was cancelled, only the new one is
        // pending.
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_expiry_invalidates_ticket() {
        let (registry, scheduler) = registry_with_scheduler();
        registry.issue_ticket("alice", Ttl::After(Duration::from_secs(30)));

        assert!(registry.has_bypass_ticket("alice", false));
        scheduler.fire_all();
        assert!(!registry.has_bypass_ticket("alice", false));
        assert_eq!(registry.active_ticket_count(), 0);
    }

    #[test]
    fn test_consumption_cancels_pending_expiry() {
        let (registry, scheduler) = registry_with_scheduler();
        registry.issue_ticket("alice", Ttl::After(Duration::from_secs(30)));
        assert_eq!(scheduler.pending(), 1);

        assert!(registry.has_bypass_ticket("alice", true));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_unlimited_ticket_schedules_no_expiry() {
        let (registry, scheduler) = registry_with_scheduler();
        registry.issue_ticket("alice", Ttl::Unlimited);

        assert_eq!(scheduler.pending(), 0);
        scheduler.fire_all();
        assert!(registry.has_bypass_ticket("alice", true));
    }

    #[test]
    fn test_zero_ttl_is_issued_then_immediately_invalid() {
        let (registry, _scheduler) = registry_with_scheduler();
        let issued = Arc::new(AtomicUsize::new(0));
        let invalidated = Arc::new(AtomicUsize::new(0));

        let count = Arc::clone(&issued);
        registry.on_ticket_issued(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        let count = Arc::clone(&invalidated);
        registry.on_ticket_invalidated(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        registry.issue_ticket("alice", Ttl::After(Duration::ZERO));

        assert_eq!(issued.load(Ordering::SeqCst), 1);
        assert_eq!(invalidated.load(Ordering::SeqCst), 1);
        assert!(!registry.has_bypass_ticket("alice", true));
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let (registry, _scheduler) = registry_with_scheduler();
        let invalidated = Arc::new(AtomicUsize::new(0));

        let count = Arc::clone(&invalidated);
        registry.on_ticket_invalidated(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        registry.issue_ticket("alice", Ttl::After(Duration::from_secs(30)));
        let ticket = registry.players_with_ticket().pop().unwrap();

        registry.invalidate_ticket(&ticket);
        registry.invalidate_ticket(&ticket);

        assert_eq!(invalidated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidating_superseded_ticket_keeps_newer_one() {
        let (registry, _scheduler) = registry_with_scheduler();
        registry.issue_ticket("alice", Ttl::After(Duration::from_secs(30)));
        let old = registry.players_with_ticket().pop().unwrap();
        registry.issue_ticket("alice", Ttl::After(Duration::from_secs(60)));

        // The old instance is already invalid; invalidating it again must not
        // remove the newer ticket from the map.
        registry.invalidate_ticket(&old);
        assert_eq!(registry.active_ticket_count(), 1);
        assert!(registry.has_bypass_ticket("alice", false));
    }

    #[test]
    fn test_invalidate_all_by_player_is_idempotent() {
        let (registry, _scheduler) = registry_with_scheduler();
        registry.issue_ticket("alice", Ttl::After(Duration::from_secs(30)));

        registry.invalidate_all_tickets_by_player("alice");
        registry.invalidate_all_tickets_by_player("alice");
        registry.invalidate_all_tickets_by_player("bob");

        assert_eq!(registry.active_ticket_count(), 0);
    }

    #[test]
    fn test_reset_is_silent_and_cancels_expiries() {
        let (registry, scheduler) = registry_with_scheduler();
        let invalidated = Arc::new(AtomicUsize::new(0));

        let count = Arc::clone(&invalidated);
        registry.on_ticket_invalidated(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        registry.issue_ticket("alice", Ttl::After(Duration::from_secs(30)));
        registry.issue_ticket("bob", Ttl::After(Duration::from_secs(30)));

        registry.reset();

        assert_eq!(registry.active_ticket_count(), 0);
        assert_eq!(invalidated.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 0);
        // A stray fire after reset must not resurrect or double-invalidate.
        scheduler.fire_all();
        assert_eq!(invalidated.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_can_consume_from_issued_notification() {
        let (registry, _scheduler) = registry_with_scheduler();
        let consumed = Arc::new(AtomicUsize::new(0));

        // Mirrors the reconciler's behavior: consume the ticket from inside
        // the issued listener. Works because notices fire after the registry
        // lock is released.
        let count = Arc::clone(&consumed);
        let registry_for_listener = Arc::downgrade(&registry);
        registry.on_ticket_issued(move |ticket| {
            if let Some(registry) = registry_for_listener.upgrade() {
                if registry.has_bypass_ticket(ticket.player_uid(), true) {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        registry.issue_ticket("alice", Ttl::After(Duration::from_secs(30)));

        assert_eq!(consumed.load(Ordering::SeqCst), 1);
        assert_eq!(registry.active_ticket_count(), 0);
    }

    #[test]
    fn test_players_with_ticket_snapshot() {
        let (registry, _scheduler) = registry_with_scheduler();
        registry.issue_ticket("alice", Ttl::After(Duration::from_secs(30)));
        registry.issue_ticket("bob", Ttl::Unlimited);

        let mut holders: Vec<String> = registry
            .players_with_ticket()
            .iter()
            .map(|ticket| ticket.player_uid().to_string())
            .collect();
        holders.sort();
        assert_eq!(holders, vec!["alice", "bob"]);
    }
}
