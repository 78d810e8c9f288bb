//! Per-story mutual exclusion.
//!
//! Operations on one story are serialized; operations on different stories
//! never wait on each other beyond a brief shard lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// Held for the duration of a story operation.
pub type StoryGuard = OwnedMutexGuard<()>;

type Shard = Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>;

/// Sharded table of async locks keyed by story id.
#[derive(Debug)]
pub struct StoryLocks {
    shards: Box<[Shard]>,
}

impl StoryLocks {
    /// Creates a table with `shard_count` shards.
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        Self {
            shards: (0..shard_count.max(1))
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
        }
    }

    /// Waits for exclusive access to `story_id`.
    pub async fn acquire(&self, story_id: Uuid) -> StoryGuard {
        let lock = {
            let count = self.shards.len() as u128;
            let index = usize::try_from(story_id.as_u128() % count).unwrap_or(0);
            let mut shard = self.shards[index]
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on are dropped.
            shard.retain(|id, lock| *id == story_id || Arc::strong_count(lock) > 1);
            Arc::clone(shard.entry(story_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of story locks currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_same_story_is_serialized() {
        // Arrange
        let locks = Arc::new(StoryLocks::new(4));
        let story_id = Uuid::new_v4();
        let entered = Arc::new(AtomicBool::new(false));
        let guard = locks.acquire(story_id).await;

        // Act
        let task = {
            let locks = Arc::clone(&locks);
            let entered = Arc::clone(&entered);
            tokio::spawn(async move {
                let _guard = locks.acquire(story_id).await;
                entered.store(true, Ordering::SeqCst);
            })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let entered_while_held = entered.load(Ordering::SeqCst);
        drop(guard);
        task.await.unwrap();

        // Assert
        assert!(!entered_while_held);
        assert!(entered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_different_stories_do_not_contend() {
        let locks = StoryLocks::new(1);

        let _first = locks.acquire(Uuid::new_v4()).await;
        let _second = locks.acquire(Uuid::new_v4()).await;

        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = StoryLocks::new(1);
        drop(locks.acquire(Uuid::new_v4()).await);
        drop(locks.acquire(Uuid::new_v4()).await);

        let _held = locks.acquire(Uuid::new_v4()).await;

        assert_eq!(locks.tracked(), 1);
    }
}
