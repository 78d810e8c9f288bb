//! In-memory deadline timers.
//!
//! Each story holds at most one pending proposal-phase timer and one pending
//! voting-phase timer. Timers are a cache of the store's deadline fields: the
//! registry can be dropped at any time and rebuilt by the rehydrator.
//!
//! Every armed timer carries a generation number. A timer task that wakes up
//! must claim its slot with that generation before running its callback, so a
//! timer that was cancelled or replaced can never fire even if it woke up
//! concurrently with the cancel. The callback runs after the slot lock is
//! released and may freely arm or cancel timers itself.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Which phase deadline a timer stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Fires when the proposal phase ends.
    Proposal,
    /// Fires when the voting phase ends.
    Voting,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposal => f.write_str("proposal"),
            Self::Voting => f.write_str("voting"),
        }
    }
}

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct StoryTimers {
    proposal: Option<ArmedTimer>,
    voting: Option<ArmedTimer>,
}

impl StoryTimers {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<ArmedTimer> {
        match kind {
            TimerKind::Proposal => &mut self.proposal,
            TimerKind::Voting => &mut self.voting,
        }
    }

    fn is_empty(&self) -> bool {
        self.proposal.is_none() && self.voting.is_none()
    }
}

type Shard = Mutex<HashMap<Uuid, StoryTimers>>;

#[derive(Debug)]
struct Inner {
    shards: Box<[Shard]>,
    next_generation: AtomicU64,
}

/// Sharded registry of pending phase timers keyed by story.
#[derive(Debug, Clone)]
pub struct TimerRegistry {
    inner: Arc<Inner>,
}

impl TimerRegistry {
    /// Creates a registry with `shard_count` independently locked shards.
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            inner: Arc::new(Inner {
                shards,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    fn shard(&self, story_id: Uuid) -> MutexGuard<'_, HashMap<Uuid, StoryTimers>> {
        let count = self.inner.shards.len() as u128;
        let index = usize::try_from(story_id.as_u128() % count).unwrap_or(0);
        self.inner.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules `on_fire` to run once after `delay`, replacing any timer of
    /// the same kind already armed for the story. Returns the new timer's
    /// generation.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn arm<F>(&self, story_id: Uuid, kind: TimerKind, delay: Duration, on_fire: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let registry = self.clone();

        let previous = {
            // The task is spawned while the shard is locked, so it cannot try
            // to claim its slot before the slot exists.
            let mut shard = self.shard(story_id);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if registry.claim(story_id, kind, generation) {
                    debug!(%story_id, %kind, generation, "timer fired");
                    on_fire.await;
                }
            });
            shard
                .entry(story_id)
                .or_default()
                .slot(kind)
                .replace(ArmedTimer { generation, handle })
        };

        if let Some(previous) = previous {
            previous.handle.abort();
            debug!(%story_id, %kind, replaced = previous.generation, "timer replaced");
        }
        debug!(
            %story_id,
            %kind,
            generation,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "timer armed"
        );
        generation
    }

    /// Arms the proposal-phase timer.
    pub fn arm_proposal<F>(&self, story_id: Uuid, delay: Duration, on_fire: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.arm(story_id, TimerKind::Proposal, delay, on_fire)
    }

    /// Arms the voting-phase timer.
    pub fn arm_voting<F>(&self, story_id: Uuid, delay: Duration, on_fire: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.arm(story_id, TimerKind::Voting, delay, on_fire)
    }

    /// Takes the slot if it still belongs to `generation`.
    fn claim(&self, story_id: Uuid, kind: TimerKind, generation: u64) -> bool {
        let mut shard = self.shard(story_id);
        let Some(timers) = shard.get_mut(&story_id) else {
            return false;
        };
        let slot = timers.slot(kind);
        if slot.as_ref().map(|t| t.generation) != Some(generation) {
            return false;
        }
        *slot = None;
        if timers.is_empty() {
            shard.remove(&story_id);
        }
        true
    }

    /// Cancels the story's timer of `kind`. Returns `false` if none was armed.
    pub fn cancel(&self, story_id: Uuid, kind: TimerKind) -> bool {
        let taken = {
            let mut shard = self.shard(story_id);
            let taken = shard
                .get_mut(&story_id)
                .and_then(|timers| timers.slot(kind).take());
            if shard.get(&story_id).is_some_and(StoryTimers::is_empty) {
                shard.remove(&story_id);
            }
            taken
        };

        match taken {
            Some(timer) => {
                timer.handle.abort();
                debug!(%story_id, %kind, generation = timer.generation, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancels the proposal-phase timer.
    pub fn cancel_proposal(&self, story_id: Uuid) -> bool {
        self.cancel(story_id, TimerKind::Proposal)
    }

    /// Cancels the voting-phase timer.
    pub fn cancel_voting(&self, story_id: Uuid) -> bool {
        self.cancel(story_id, TimerKind::Voting)
    }

    /// Cancels both timers of a story.
    pub fn cancel_all(&self, story_id: Uuid) {
        self.cancel(story_id, TimerKind::Proposal);
        self.cancel(story_id, TimerKind::Voting);
    }

    /// Returns `true` if a timer of `kind` is pending for the story.
    #[must_use]
    pub fn is_armed(&self, story_id: Uuid, kind: TimerKind) -> bool {
        let mut shard = self.shard(story_id);
        shard
            .get_mut(&story_id)
            .is_some_and(|timers| timers.slot(kind).is_some())
    }

    /// Generation of the pending timer of `kind`, if any.
    #[must_use]
    pub fn generation(&self, story_id: Uuid, kind: TimerKind) -> Option<u64> {
        let mut shard = self.shard(story_id);
        shard
            .get_mut(&story_id)
            .and_then(|timers| timers.slot(kind).as_ref().map(|t| t.generation))
    }

    /// Total number of pending timers across all stories.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.inner
            .shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .map(|t| usize::from(t.proposal.is_some()) + usize::from(t.voting.is_some()))
                    .sum::<usize>()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_timer_fires_once_and_clears_its_slot() {
        // Arrange
        let registry = TimerRegistry::new(4);
        let story_id = Uuid::new_v4();
        let fired = counter();

        // Act
        registry.arm_proposal(story_id, Duration::from_millis(100), bump(&fired));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let fired_early = fired.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Assert
        assert_eq!(fired_early, 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!registry.is_armed(story_id, TimerKind::Proposal));
        assert_eq!(registry.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let registry = TimerRegistry::new(4);
        let story_id = Uuid::new_v4();
        let fired = counter();

        registry.arm_voting(story_id, Duration::from_millis(100), bump(&fired));
        assert!(registry.cancel_voting(story_id));
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!registry.is_armed(story_id, TimerKind::Voting));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let registry = TimerRegistry::new(4);
        let story_id = Uuid::new_v4();

        assert!(!registry.cancel_proposal(story_id));
        assert!(!registry.cancel_voting(story_id));
        registry.cancel_all(story_id);
        registry.cancel_all(story_id);

        assert_eq!(registry.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_replaces_the_stale_timer() {
        let registry = TimerRegistry::new(4);
        let story_id = Uuid::new_v4();
        let stale = counter();
        let fresh = counter();

        let first = registry.arm_proposal(story_id, Duration::from_millis(100), bump(&stale));
        let second = registry.arm_proposal(story_id, Duration::from_millis(200), bump(&fresh));
        tokio::time::sleep(Duration::from_millis(150)).await;
        let fresh_early = fresh.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(second > first);
        assert_eq!(fresh_early, 0);
        assert_eq!(stale.load(Ordering::SeqCst), 0);
        assert_eq!(fresh.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_cannot_claim_a_replaced_slot() {
        let registry = TimerRegistry::new(4);
        let story_id = Uuid::new_v4();

        let first = registry.arm_proposal(story_id, Duration::from_secs(60), async {});
        let second = registry.arm_proposal(story_id, Duration::from_secs(60), async {});

        assert!(!registry.claim(story_id, TimerKind::Proposal, first));
        assert_eq!(registry.generation(story_id, TimerKind::Proposal), Some(second));
        assert!(registry.claim(story_id, TimerKind::Proposal, second));
        assert!(!registry.claim(story_id, TimerKind::Proposal, second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kinds_are_independent() {
        let registry = TimerRegistry::new(4);
        let story_id = Uuid::new_v4();
        let proposal = counter();
        let voting = counter();

        registry.arm_proposal(story_id, Duration::from_millis(100), bump(&proposal));
        registry.arm_voting(story_id, Duration::from_millis(100), bump(&voting));
        registry.cancel_proposal(story_id);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(proposal.load(Ordering::SeqCst), 0);
        assert_eq!(voting.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_may_arm_the_other_timer() {
        // Arrange
        let registry = TimerRegistry::new(1);
        let story_id = Uuid::new_v4();
        let voting = counter();
        let inner_registry = registry.clone();
        let on_voting = bump(&voting);

        // Act
        registry.arm_proposal(story_id, Duration::from_millis(100), async move {
            inner_registry.arm_voting(story_id, Duration::from_millis(100), on_voting);
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        let armed_between = registry.is_armed(story_id, TimerKind::Voting);
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Assert
        assert!(armed_between);
        assert_eq!(voting.load(Ordering::SeqCst), 1);
        assert_eq!(registry.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stories_do_not_interfere() {
        let registry = TimerRegistry::new(2);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let fired = counter();

        registry.arm_proposal(first, Duration::from_millis(100), bump(&fired));
        registry.arm_proposal(second, Duration::from_millis(100), bump(&fired));
        registry.cancel_all(first);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
