//! Matchmaking queue implementation

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::ws::protocol::PlayerProfile;

use super::ConnectionId;

/// Connection waiting to be paired, with the profile it queued under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub connection_id: ConnectionId,
    pub profile: PlayerProfile,
    pub queued_at: Instant,
}

impl QueueEntry {
    pub fn new(connection_id: ConnectionId, profile: PlayerProfile) -> Self {
        Self {
            connection_id,
            profile,
            queued_at: Instant::now(),
        }
    }

    /// How long this player has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// Result of an enqueue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// Still waiting at this 0-indexed position
    Waiting { position: usize },
    /// The two longest-waiting entries, oldest first
    Paired(QueueEntry, QueueEntry),
}

/// Enqueue refused at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("matchmaking queue is full ({0} entries)")]
pub struct QueueFull(pub usize);

/// FIFO pairing queue. Pure arrival order, no attributes considered.
pub struct MatchmakingQueue {
    queue: VecDeque<QueueEntry>,
    max_size: usize,
}

impl MatchmakingQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max_size,
        }
    }

    /// Append `connection_id` and pair the two oldest entries if possible.
    /// A connection already waiting keeps its place and its first profile.
    pub fn enqueue(
        &mut self,
        connection_id: ConnectionId,
        profile: PlayerProfile,
    ) -> Result<Enqueued, QueueFull> {
        if let Some(position) = self.position(&connection_id) {
            return Ok(Enqueued::Waiting { position });
        }

        // A join that pairs shrinks the queue; only one that waits can overflow it
        let waits = self.queue.len() + 1 < 2;
        if waits && self.queue.len() >= self.max_size {
            return Err(QueueFull(self.max_size));
        }

        self.queue.push_back(QueueEntry::new(connection_id, profile));

        if self.queue.len() >= 2 {
            if let (Some(first), Some(second)) = (self.queue.pop_front(), self.queue.pop_front()) {
                return Ok(Enqueued::Paired(first, second));
            }
        }

        Ok(Enqueued::Waiting {
            position: self.queue.len() - 1,
        })
    }

    /// Remove a waiting connection. No-op if absent.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<QueueEntry> {
        let pos = self.position(connection_id)?;
        self.queue.remove(pos)
    }

    pub fn position(&self, connection_id: &ConnectionId) -> Option<usize> {
        self.queue
            .iter()
            .position(|entry| &entry.connection_id == connection_id)
    }

    /// Check if a connection is in the queue
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.position(connection_id).is_some()
    }

    /// Get queue length
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for MatchmakingQueue {
    fn default() -> Self {
        Self::new(1024)
    }
}
