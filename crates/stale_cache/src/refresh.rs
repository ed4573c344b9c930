// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Background refresh of stale entries.

use std::{
    fmt::{Debug, Display},
    panic::AssertUnwindSafe,
    sync::Arc,
};

use anyspawn::Spawner;
use futures_util::FutureExt;
use tick::Clock;

use crate::entry::Entry;

/// Everything a detached refresh task needs. The cache itself is not captured, so a
/// refresh can outlive the [`StaleCache`](crate::StaleCache) that started it.
pub(crate) struct Refresh<K, V, E> {
    pub(crate) cache_name: &'static str,
    pub(crate) key: K,
    pub(crate) entry: Arc<Entry<V, E>>,
    pub(crate) clock: Clock,
}

impl<K, V, E> Refresh<K, V, E>
where
    K: Debug + Send + 'static,
    V: Send + 'static,
    E: Display + Send + 'static,
{
    /// Runs `compute` on `spawner` and commits its outcome to the entry.
    ///
    /// The caller must have set `working` on the entry before calling this. The task clears it
    /// again once the outcome is known, whether the computation succeeded, failed or panicked.
    /// Failures are only logged: the previous value and its timestamp stay in place.
    pub(crate) fn spawn<Fut>(self, spawner: &Spawner, compute: Fut)
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        tracing::debug!(
            cache.name = self.cache_name,
            cache.key = ?self.key,
            "cache.refresh.started"
        );

        // Fire-and-forget: nobody awaits the handle.
        drop(spawner.spawn(self.run(compute)));
    }

    async fn run<Fut>(self, compute: Fut)
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let outcome = AssertUnwindSafe(compute).catch_unwind().await;

        let mut state = self.entry.lock().await;
        state.working = false;

        match outcome {
            Ok(Ok(value)) => {
                state.commit(value, self.clock.instant());
                tracing::debug!(
                    cache.name = self.cache_name,
                    cache.key = ?self.key,
                    "cache.refresh.committed"
                );
            }
            Ok(Err(error)) => {
                tracing::error!(
                    cache.name = self.cache_name,
                    cache.key = ?self.key,
                    error = %error,
                    "cache.refresh.failed"
                );
            }
            Err(_) => {
                tracing::error!(
                    cache.name = self.cache_name,
                    cache.key = ?self.key,
                    "cache.refresh.panicked"
                );
            }
        }
    }
}
