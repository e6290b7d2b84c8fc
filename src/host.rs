//! Host-side collaborator contracts

use crate::queue::QueuedClient;

/// World capacity numbers, queried on demand.
pub trait CapacitySource: Send + Sync {
    /// Total configured player capacity.
    fn total_capacity(&self) -> usize;

    /// Currently admitted player count.
    fn population(&self) -> usize;
}

/// Admits a previously queued client into the live population.
pub trait FinalizeSink: Send + Sync {
    /// Completes the connection for `client`. Called at most once per queued
    /// client.
    fn finalize_join(&self, client: QueuedClient);
}
