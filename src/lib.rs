//! # Requeue Relief
//!
//! Admission-queue augmentation for capacity-limited multiplayer servers:
//! players who disconnect briefly (crash, timeout, mod download, normal quit)
//! get a *bypass ticket* — a time-limited reserved re-entry slot — so they can
//! skip the wait-queue when they reconnect, and capacity freed when tickets
//! expire or get consumed is backfilled from the queue.
//!
//! ## Core Components
//!
//! ### Ticket Registry (`registry`)
//! Concurrency-safe issuance, atomic check-and-consume, invalidation, and
//! TTL-based expiry of per-player reservations. At most one valid ticket
//! exists per player; reissuing supersedes. Issuance and invalidation
//! notifications drive the admission policy.
//!
//! ### Disconnect Classifier (`classifier`)
//! Tracks when each connection was accepted and, on disconnect, turns the
//! transport's free-text reason plus the session duration into a semantic
//! cause (quit / kicked / crash / timeout) and a failed-join flag. The reason
//! matching is a documented heuristic, not a guaranteed classification.
//!
//! ### Admission Reconciler (`reconciler`)
//! The policy glue: maps classified causes to configured ticket TTLs, pulls a
//! freshly ticketed player straight out of the wait-queue if they are already
//! back in it, and backfills freed capacity from the queue head whenever a
//! ticket is invalidated.
//!
//! ## Collaborator Contracts
//!
//! The core owns no queue, no sockets, and no world state. The host provides
//! a [`queue::WaitQueue`], a [`host::CapacitySource`], and a
//! [`host::FinalizeSink`]; the core provides `try_bypass` plus the
//! accepted/disconnected entry points and drives everything else through its
//! internal notifications. Ticket expiry runs on a pluggable
//! [`scheduler::Scheduler`] (tokio-backed in production, manually fired in
//! tests).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use requeue_relief::classifier::DisconnectClassifier;
//! use requeue_relief::config::Config;
//! use requeue_relief::reconciler::{AdmissionReconciler, TtlPolicy};
//! use requeue_relief::registry::TicketRegistry;
//! use requeue_relief::scheduler::TokioScheduler;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn collaborators() -> (std::sync::Arc<dyn requeue_relief::queue::WaitQueue>, std::sync::Arc<dyn requeue_relief::host::CapacitySource>, std::sync::Arc<dyn requeue_relief::host::FinalizeSink>) { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Path::new("requeue-relief.json"))?;
//!     let scheduler = Arc::new(TokioScheduler::from_current()?);
//!     let registry = TicketRegistry::new(scheduler);
//!     let classifier = Arc::new(DisconnectClassifier::new(
//!         config.timings.failed_join_threshold(),
//!     ));
//!     let (queue, capacity, finalizer) = collaborators();
//!
//!     let reconciler = AdmissionReconciler::new(
//!         registry,
//!         classifier,
//!         queue,
//!         capacity,
//!         finalizer,
//!         TtlPolicy::from_timings(&config.timings),
//!     );
//!     reconciler.attach();
//!
//!     // Host admission path while the server is full:
//!     if reconciler.try_bypass("player-uid") {
//!         // admit unconditionally
//!     }
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod commands;
pub mod config;
pub mod events;
pub mod host;
pub mod queue;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod ticket;
