// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-key state shared between the store and in-flight operations.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// A store slot. The mutex serializes every read and write of the slot's state,
/// and is held for the whole duration of an inline computation.
pub(crate) type Entry<V, E> = Mutex<EntryState<V, E>>;

#[derive(Debug)]
pub(crate) struct EntryState<V, E> {
    /// When `value` was last produced. `None` until the first success.
    pub(crate) last_computed: Option<Instant>,
    pub(crate) value: Option<V>,
    /// Set by a failed inline computation, cleared by a successful error retry.
    pub(crate) error: Option<E>,
    /// A background refresh is in flight.
    pub(crate) working: bool,
}

impl<V, E> Default for EntryState<V, E> {
    fn default() -> Self {
        Self {
            last_computed: None,
            value: None,
            error: None,
            working: false,
        }
    }
}

impl<V, E> EntryState<V, E> {
    /// Returns true when the value is at least `ttl` old at `now`.
    ///
    /// An entry that was never computed is always stale.
    pub(crate) fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        self.last_computed
            .is_none_or(|computed_at| now.saturating_duration_since(computed_at) >= ttl)
    }

    /// Stores a freshly computed value.
    pub(crate) fn commit(&mut self, value: V, now: Instant) {
        self.value = Some(value);
        self.last_computed = Some(now);
    }
}
