//! Administrative console commands
//!
//! Thin calls into the registry, reconciler, and queue contracts; no
//! admission logic lives here.

use crate::queue::WaitQueue;
use crate::reconciler::AdmissionReconciler;
use crate::registry::{TicketRegistry, Ttl};
use clap::Parser;
use log::info;
use std::time::Duration;

/// Operator commands for inspecting and steering the admission core.
#[derive(Debug, Parser)]
#[clap(name = "queue", no_binary_name = true)]
pub enum AdminCommand {
    /// Show ticket count, queue size, and remaining capacity
    Status,
    /// List players currently holding a bypass ticket
    Tickets,
    /// Invalidate all bypass tickets and forget session history
    Reset,
    /// Evict every waiting client from the queue
    Evict {
        /// Reason shown to evicted clients
        #[clap(default_value = "Queue cleared by an administrator")]
        reason: String,
    },
    /// Manually issue a bypass ticket for a player
    Fastpass {
        player_uid: String,
        /// Ticket lifetime in seconds
        #[clap(default_value_t = 900)]
        seconds: u64,
        /// Issue a ticket that never expires
        #[clap(long)]
        permanent: bool,
    },
}

impl AdminCommand {
    /// Parses a console line, e.g. `fastpass some-player-uid 300`.
    pub fn parse_line(line: &str) -> Result<Self, clap::Error> {
        Self::try_parse_from(line.split_whitespace())
    }
}

/// Executes a command and returns the text to show the operator.
pub fn execute(
    command: AdminCommand,
    registry: &TicketRegistry,
    reconciler: &AdmissionReconciler,
    queue: &dyn WaitQueue,
) -> String {
    match command {
        AdminCommand::Status => format!(
            "{} active ticket(s), {} queued client(s), {} slot(s) remaining",
            registry.active_ticket_count(),
            queue.len(),
            reconciler.remaining_capacity()
        ),
        AdminCommand::Tickets => {
            let holders = registry.players_with_ticket();
            if holders.is_empty() {
                "No active bypass tickets".to_string()
            } else {
                let names: Vec<&str> = holders.iter().map(|ticket| ticket.player_uid()).collect();
                format!("Ticket holders: {}", names.join(", "))
            }
        }
        AdminCommand::Reset => {
            reconciler.reset();
            "Cleared all bypass tickets and session history".to_string()
        }
        AdminCommand::Evict { reason } => {
            let count = queue.remove_all(&reason);
            format!("Evicted {} client(s) from the queue", count)
        }
        AdminCommand::Fastpass {
            player_uid,
            seconds,
            permanent,
        } => {
            let ttl = if permanent {
                Ttl::Unlimited
            } else {
                Ttl::After(Duration::from_secs(seconds))
            };
            info!("Manual fastpass for player {}", player_uid);
            registry.issue_ticket(&player_uid, ttl);
            if permanent {
                format!("Issued permanent bypass ticket for {}", player_uid)
            } else {
                format!("Issued bypass ticket for {} ({}s)", player_uid, seconds)
            }
        }
    }
}
