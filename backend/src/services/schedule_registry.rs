use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Longest single sleep; the wall clock is re-checked after each one
const MAX_SLEEP: Duration = Duration::from_secs(24 * 60 * 60);

struct ArmedTimer {
    generation: u64,
    fire_at: DateTime<Utc>,
    handle: AbortHandle,
}

/// In-memory table of pending timers, at most one per entity id.
///
/// Timers are tokio tasks spawned on the runtime the registry was created with.
/// Nothing here is persisted: after a restart the table is rebuilt from storage.
pub struct ScheduleRegistry {
    /// Used in log lines to tell registries apart
    name: &'static str,
    timers: Mutex<HashMap<Uuid, ArmedTimer>>,
    next_generation: AtomicU64,
    runtime: Handle,
}

impl ScheduleRegistry {
    pub fn new(name: &'static str, runtime: Handle) -> Arc<Self> {
        Arc::new(Self {
            name,
            timers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            runtime,
        })
    }

    /// Arm a timer for `id` that invokes `callback` at `fire_at`, replacing any timer
    /// already armed for the same id. A `fire_at` in the past fires right away.
    ///
    /// The timer removes itself from the registry before the callback runs, so the
    /// callback may arm `id` again.
    pub fn arm<F>(self: &Arc<Self>, id: Uuid, fire_at: DateTime<Utc>, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(self);

        // Held across the spawn so the timer cannot release itself before it is inserted
        let mut timers = self.lock();
        if let Some(previous) = timers.remove(&id) {
            previous.handle.abort();
            log::debug!("[{}] superseded timer for {} at {}", self.name, id, previous.fire_at);
        }

        let task = self.runtime.spawn(async move {
            sleep_until(fire_at).await;
            if registry.release(id, generation) {
                callback();
            }
        });

        timers.insert(
            id,
            ArmedTimer {
                generation,
                fire_at,
                handle: task.abort_handle(),
            },
        );
    }

    /// Cancel the timer for `id`. Returns false when none was armed.
    pub fn cancel(&self, id: &Uuid) -> bool {
        match self.lock().remove(id) {
            Some(timer) => {
                timer.handle.abort();
                log::debug!("[{}] cancelled timer for {}", self.name, id);
                true
            }
            None => false,
        }
    }

    pub fn has(&self, id: &Uuid) -> bool {
        self.lock().contains_key(id)
    }

    /// When the live timer for `id` is due
    pub fn fire_time(&self, id: &Uuid) -> Option<DateTime<Utc>> {
        self.lock().get(id).map(|timer| timer.fire_at)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove the entry for a timer that just elapsed, unless it was cancelled or
    /// superseded in the meantime
    fn release(&self, id: Uuid, generation: u64) -> bool {
        let mut timers = self.lock();
        match timers.get(&id) {
            Some(timer) if timer.generation == generation => {
                timers.remove(&id);
                true
            }
            _ => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, ArmedTimer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn sleep_until(fire_at: DateTime<Utc>) {
    loop {
        let remaining = (fire_at - Utc::now()).to_std().unwrap_or_default();
        if remaining.is_zero() {
            return;
        }
        tokio::time::sleep(remaining.min(MAX_SLEEP)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn soon() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::milliseconds(50)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    #[tokio::test]
    async fn test_arming_twice_keeps_one_timer() {
        let registry = ScheduleRegistry::new("test", Handle::current());
        let id = Uuid::new_v4();
        let first = Utc::now() + chrono::Duration::hours(1);
        let second = Utc::now() + chrono::Duration::hours(2);

        registry.arm(id, first, || {});
        registry.arm(id, second, || {});

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.fire_time(&id), Some(second));
    }

    #[tokio::test]
    async fn test_superseded_timer_never_fires() {
        let registry = ScheduleRegistry::new("test", Handle::current());
        let id = Uuid::new_v4();
        let first = counter();
        let second = counter();

        registry.arm(id, soon(), bump(&first));
        registry.arm(id, soon(), bump(&second));
        settle().await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert!(!registry.has(&id));
    }

    #[tokio::test]
    async fn test_cancel_prevents_firing() {
        let registry = ScheduleRegistry::new("test", Handle::current());
        let id = Uuid::new_v4();
        let fired = counter();

        registry.arm(id, soon(), bump(&fired));
        assert!(registry.cancel(&id));
        settle().await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let registry = ScheduleRegistry::new("test", Handle::current());
        let id = Uuid::new_v4();

        assert!(!registry.cancel(&id));
        registry.arm(id, Utc::now() + chrono::Duration::hours(1), || {});
        assert!(registry.cancel(&id));
        assert!(!registry.cancel(&id));
    }

    #[tokio::test]
    async fn test_past_fire_time_fires_immediately() {
        let registry = ScheduleRegistry::new("test", Handle::current());
        let id = Uuid::new_v4();
        let fired = counter();

        registry.arm(id, Utc::now() - chrono::Duration::minutes(5), bump(&fired));
        settle().await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!registry.has(&id));
    }

    #[tokio::test]
    async fn test_callback_can_rearm_same_id() {
        let registry = ScheduleRegistry::new("test", Handle::current());
        let id = Uuid::new_v4();
        let later = Utc::now() + chrono::Duration::hours(1);

        let inner = Arc::clone(&registry);
        registry.arm(id, soon(), move || {
            inner.arm(id, later, || {});
        });
        settle().await;

        assert!(registry.has(&id));
        assert_eq!(registry.fire_time(&id), Some(later));
    }

    #[tokio::test]
    async fn test_distinct_ids_are_independent() {
        let registry = ScheduleRegistry::new("test", Handle::current());
        let fired = counter();

        registry.arm(Uuid::new_v4(), soon(), bump(&fired));
        registry.arm(Uuid::new_v4(), soon(), bump(&fired));
        settle().await;

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
