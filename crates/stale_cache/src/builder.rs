// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for [`StaleCache`].

use std::marker::PhantomData;

use anyspawn::Spawner;
use tick::Clock;

use crate::StaleCache;

const DEFAULT_NAME: &str = "stale_cache";

/// Configures and creates a [`StaleCache`].
///
/// Created by [`StaleCache::builder`].
#[derive(Debug)]
pub struct StaleCacheBuilder<K, V, E> {
    clock: Clock,
    spawner: Option<Spawner>,
    name: &'static str,
    _phantom: PhantomData<fn() -> (K, V, E)>,
}

impl<K, V, E> StaleCacheBuilder<K, V, E> {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            clock,
            spawner: None,
            name: DEFAULT_NAME,
            _phantom: PhantomData,
        }
    }

    /// Sets the name reported in the `cache.name` field of log events.
    ///
    /// Defaults to `"stale_cache"`.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Sets the spawner that runs background refreshes.
    ///
    /// Defaults to [`Spawner::new_tokio`], in which case [`StaleCache::get`] must be called
    /// from within a Tokio runtime whenever it may start a refresh.
    #[must_use]
    pub fn spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Creates the cache.
    #[must_use]
    pub fn build(self) -> StaleCache<K, V, E> {
        let spawner = self.spawner.unwrap_or_else(Spawner::new_tokio);
        StaleCache::from_parts(self.clock, spawner, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cache = StaleCacheBuilder::<String, u32, String>::new(Clock::new_frozen()).build();
        assert_eq!(cache.name(), DEFAULT_NAME);
        assert!(cache.is_empty());
    }

    #[test]
    fn name_is_applied() {
        let cache = StaleCacheBuilder::<String, u32, String>::new(Clock::new_frozen())
            .name("tokens")
            .build();
        assert_eq!(cache.name(), "tokens");
    }

    #[test]
    fn builder_debug() {
        let builder = StaleCacheBuilder::<String, u32, String>::new(Clock::new_frozen()).name("dbg");
        let debug_str = format!("{builder:?}");
        assert!(debug_str.contains("StaleCacheBuilder"));
        assert!(debug_str.contains("dbg"));
    }
}
