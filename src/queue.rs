//! Wait-queue collaborator contract and an in-memory FIFO implementation

use log::info;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Identification of a client parked in the wait-queue: everything the host
/// needs to finalize the connection later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedClient {
    pub connection_id: u32,
    pub player_uid: String,
}

impl QueuedClient {
    pub fn new(connection_id: u32, player_uid: &str) -> Self {
        Self {
            connection_id,
            player_uid: player_uid.to_string(),
        }
    }
}

/// The FIFO wait-queue the admission core pulls from.
///
/// The queue itself is owned by the host; the core only needs targeted
/// removal, head removal, and bulk eviction.
pub trait WaitQueue: Send + Sync {
    /// Number of waiting clients.
    fn len(&self) -> usize;

    /// Removes and returns the waiting client with the given player identity.
    fn remove_by_id(&self, player_uid: &str) -> Option<QueuedClient>;

    /// Removes and returns the client at the head of the queue.
    fn remove_next(&self) -> Option<QueuedClient>;

    /// Evicts every waiting client. Returns how many were removed.
    fn remove_all(&self, reason: &str) -> usize;
}

/// Mutex-guarded FIFO queue used by the demo host and tests.
#[derive(Default)]
pub struct FifoWaitQueue {
    waiting: Mutex<VecDeque<QueuedClient>>,
}

impl FifoWaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a client at the back of the queue.
    pub fn enqueue(&self, client: QueuedClient) {
        self.waiting.lock().unwrap().push_back(client);
    }
}

impl WaitQueue for FifoWaitQueue {
    fn len(&self) -> usize {
        self.waiting.lock().unwrap().len()
    }

    fn remove_by_id(&self, player_uid: &str) -> Option<QueuedClient> {
        let mut waiting = self.waiting.lock().unwrap();
        let index = waiting.iter().position(|client| client.player_uid == player_uid)?;
        waiting.remove(index)
    }

    fn remove_next(&self) -> Option<QueuedClient> {
        self.waiting.lock().unwrap().pop_front()
    }

    fn remove_all(&self, reason: &str) -> usize {
        let mut waiting = self.waiting.lock().unwrap();
        let count = waiting.len();
        waiting.clear();
        if count > 0 {
            info!("Evicted {} queued client(s): {}", count, reason);
        }
        count
    }
}
