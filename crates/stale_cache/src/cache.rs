// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The [`StaleCache`] type.

use std::{
    collections::HashMap,
    fmt::{Debug, Display},
    hash::Hash,
    sync::Arc,
    time::Duration,
};

use anyspawn::Spawner;
use parking_lot::Mutex as SyncMutex;
use tick::Clock;
use tokio::sync::OwnedMutexGuard;

use crate::{
    builder::StaleCacheBuilder,
    entry::{Entry, EntryState},
    refresh::Refresh,
};

type Store<K, V, E> = SyncMutex<HashMap<K, Arc<Entry<V, E>>>>;

/// A keyed cache that serves stale values while recomputing them in the background.
///
/// Each call to [`get`](Self::get) supplies the function that produces the value, so callers
/// can capture per-call context in it. The cache decides whether that function runs inline,
/// in the background, or not at all:
///
/// | Entry state                              | Behavior                                         |
/// |------------------------------------------|--------------------------------------------------|
/// | missing, or no successful value yet      | compute inline, return the outcome               |
/// | younger than `ttl`                       | return the cached value                          |
/// | stale, last inline attempt failed        | compute inline, return the outcome               |
/// | stale, no refresh running                | return the cached value, refresh in background   |
/// | stale, refresh already running           | return the cached value                          |
///
/// Concurrent callers of the same key queue behind an inline computation instead of starting
/// their own, so a burst of requests for a cold key runs the computation once.
///
/// A failed background refresh is logged and otherwise ignored: the previous value keeps being
/// served and the next stale read schedules another refresh.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use stale_cache::StaleCache;
/// use tick::Clock;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = StaleCache::<String, u32, String>::new(Clock::new_frozen());
///
/// let value = cache
///     .get(&"answer".to_string(), Duration::from_secs(60), || async { Ok(42) })
///     .await;
/// assert_eq!(value, Ok(42));
///
/// // Fresh values are served without running the computation.
/// let value = cache
///     .get(&"answer".to_string(), Duration::from_secs(60), || async { Ok(0) })
///     .await;
/// assert_eq!(value, Ok(42));
/// # }
/// ```
///
/// # Locking
///
/// The store lock only guards membership and is never held while waiting for an entry. The
/// single nesting happens when a key is first inserted: the new entry is locked before it
/// becomes visible, so nobody can be waiting on it yet.
pub struct StaleCache<K, V, E> {
    store: Store<K, V, E>,
    clock: Clock,
    spawner: Spawner,
    name: &'static str,
}

impl<K, V, E> Debug for StaleCache<K, V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaleCache")
            .field("name", &self.name)
            .field("len", &self.store.lock().len())
            .finish_non_exhaustive()
    }
}

impl<K, V, E> StaleCache<K, V, E> {
    /// Creates a cache that reads time from `clock` and refreshes on the Tokio runtime.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self::builder(clock).build()
    }

    /// Creates a builder for a cache that reads time from `clock`.
    ///
    /// # Examples
    ///
    /// ```
    /// use anyspawn::Spawner;
    /// use stale_cache::StaleCache;
    /// use tick::Clock;
    ///
    /// let cache = StaleCache::<String, u32, String>::builder(Clock::new_frozen())
    ///     .name("endpoints")
    ///     .spawner(Spawner::new_tokio())
    ///     .build();
    /// assert!(cache.is_empty());
    /// ```
    #[must_use]
    pub fn builder(clock: Clock) -> StaleCacheBuilder<K, V, E> {
        StaleCacheBuilder::new(clock)
    }

    pub(crate) fn from_parts(clock: Clock, spawner: Spawner, name: &'static str) -> Self {
        Self {
            store: SyncMutex::new(HashMap::new()),
            clock,
            spawner,
            name,
        }
    }

    /// The name attached to this cache's log events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of keys that have been requested so far.
    ///
    /// Keys are never removed, including those whose computation has only ever failed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    /// Returns true if no key has been requested yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }
}

impl<K, V, E> StaleCache<K, V, E>
where
    K: Clone + Eq + Hash + Debug + Send + 'static,
    V: Clone + Send + 'static,
    E: Clone + Display + Send + 'static,
{
    /// Returns the value for `key`, computing it with `compute` when required.
    ///
    /// Values younger than `ttl` are returned as is. Stale values are returned immediately
    /// while `compute` runs in the background, unless the last inline computation for this
    /// key failed, in which case `compute` runs inline. Keys without a value always compute
    /// inline.
    ///
    /// # Errors
    ///
    /// Returns the error of `compute` when it ran inline and failed. Background failures are
    /// never returned.
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future while it computes inline abandons that computation. The
    /// entry keeps its previous state, so the next caller computes again.
    pub async fn get<F, Fut>(&self, key: &K, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (entry, mut state) = self.lock_entry(key).await;

        let Some(value) = state.value.clone() else {
            return self.compute_inline(&mut state, compute).await;
        };

        if !state.is_stale(self.clock.instant(), ttl) {
            return Ok(value);
        }

        // The last inline attempt failed, so this caller recomputes inline instead of
        // handing the work to the background.
        if let Some(error) = &state.error {
            tracing::error!(
                cache.name = self.name,
                cache.key = ?key,
                error = %error,
                "cache.retry.inline"
            );

            let result = self.compute_inline(&mut state, compute).await;
            if result.is_ok() {
                state.error = None;
            }
            return result;
        }

        if !state.working {
            state.working = true;
            Refresh {
                cache_name: self.name,
                key: key.clone(),
                entry,
                clock: self.clock.clone(),
            }
            .spawn(&self.spawner, compute());
        }

        Ok(value)
    }

    /// Finds or creates the entry for `key` and locks it.
    async fn lock_entry(&self, key: &K) -> (Arc<Entry<V, E>>, OwnedMutexGuard<EntryState<V, E>>) {
        let existing = {
            let mut store = self.store.lock();
            match store.get(key) {
                Some(entry) => Arc::clone(entry),
                None => {
                    let entry = Arc::new(Entry::default());
                    let state = Arc::clone(&entry)
                        .try_lock_owned()
                        .expect("a freshly created entry cannot be locked by anyone else");
                    store.insert(key.clone(), Arc::clone(&entry));
                    return (entry, state);
                }
            }
        };

        let state = Arc::clone(&existing).lock_owned().await;
        (existing, state)
    }

    async fn compute_inline<F, Fut>(&self, state: &mut EntryState<V, E>, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        match compute().await {
            Ok(value) => {
                state.commit(value.clone(), self.clock.instant());
                Ok(value)
            }
            Err(error) => {
                state.error = Some(error.clone());
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tick::ClockControl;

    use super::*;
    use crate::testing::LogCapture;

    const TTL: Duration = Duration::from_secs(60);

    fn key(name: &str) -> String {
        name.to_string()
    }

    async fn explode() -> Result<u32, String> {
        panic!("refresh blew up")
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn failed_background_refresh_is_logged_and_keeps_value() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let control = ClockControl::new();
        let cache = StaleCache::<String, u32, String>::builder(control.to_clock())
            .name("endpoints")
            .build();

        assert_eq!(cache.get(&key("k"), TTL, || async { Ok(1) }).await, Ok(1));
        control.advance(TTL);

        let stale = cache
            .get(&key("k"), TTL, || async { Err("upstream down".to_string()) })
            .await;
        assert_eq!(stale, Ok(1));
        settle().await;

        capture.assert_contains("cache.refresh.failed");
        capture.assert_contains("upstream down");
        capture.assert_contains("endpoints");

        let entry = Arc::clone(cache.store.lock().get(&key("k")).expect("entry exists"));
        let state = entry.lock().await;
        assert_eq!(state.value, Some(1));
        assert!(state.error.is_none(), "background failures are not recorded");
        assert!(!state.working);
    }

    #[tokio::test]
    async fn panicking_background_refresh_clears_working() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let control = ClockControl::new();
        let cache = StaleCache::<String, u32, String>::new(control.to_clock());

        assert_eq!(cache.get(&key("k"), TTL, || async { Ok(1) }).await, Ok(1));
        control.advance(TTL);

        let stale = cache.get(&key("k"), TTL, explode).await;
        assert_eq!(stale, Ok(1));
        settle().await;

        capture.assert_contains("cache.refresh.panicked");

        // The next stale read is free to start another refresh.
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let stale = cache
            .get(&key("k"), TTL, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
            .await;
        assert_eq!(stale, Ok(1));
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&key("k"), TTL, || async { Ok(3) }).await, Ok(2));
    }

    #[tokio::test]
    async fn inline_retry_of_stale_error_is_logged() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let control = ClockControl::new();
        let cache = StaleCache::<String, u32, String>::new(control.to_clock());

        let first = cache.get(&key("k"), TTL, || async { Err("cold start".to_string()) }).await;
        assert_eq!(first, Err("cold start".to_string()));
        assert_eq!(cache.get(&key("k"), TTL, || async { Ok(1) }).await, Ok(1));

        control.advance(TTL);
        assert_eq!(cache.get(&key("k"), TTL, || async { Ok(2) }).await, Ok(2));

        capture.assert_contains("cache.retry.inline");
        capture.assert_contains("cold start");
    }

    #[test]
    fn debug_includes_name_and_len() {
        let cache = StaleCache::<String, u32, String>::builder(Clock::new_frozen())
            .name("debuggable")
            .build();

        let debug_str = format!("{cache:?}");
        assert!(debug_str.contains("StaleCache"));
        assert!(debug_str.contains("debuggable"));
        assert!(debug_str.contains("len: 0"));
    }
}
