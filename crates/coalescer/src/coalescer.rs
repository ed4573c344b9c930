// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    collections::{HashMap, hash_map::Entry},
    fmt::Debug,
    hash::Hash,
    sync::Arc,
};

use parking_lot::Mutex as SyncMutex;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result, admission::AdmissionGate, waiter::Waiter};

type Memo<K, V, E> = SyncMutex<HashMap<K, Arc<Waiter<V, E>>>>;

/// Memoizes a keyed async computation so that it runs once per key.
///
/// The first caller for a key (the "leader") runs the work function; every other caller for the
/// same key (a "joiner") waits for that run and receives a clone of its outcome. Outcomes are
/// kept, so callers that arrive after the run has finished receive the same outcome without
/// running anything. This includes errors: a failed key keeps failing until it is
/// [forgotten](Self::forget).
///
/// An optional [concurrency limit](Self::set_concurrency_limit) bounds how many leaders may run
/// at once. Joiners are never limited.
///
/// # Examples
///
/// ```
/// use coalescer::Coalescer;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let lengths = Coalescer::new(|_cancel, key: String| async move {
///     Ok::<_, String>(key.len())
/// });
///
/// let cancel = CancellationToken::new();
/// assert_eq!(lengths.work(&cancel, "hello".to_string()).await, Ok(5));
/// # }
/// ```
///
/// # Cancellation
///
/// Each call takes a [`CancellationToken`]. It only bounds the caller's own wait: a cancelled
/// joiner returns [`Error::Cancelled`] while the computation and the other joiners carry on. The
/// leader's token is handed to the work function, which decides whether to honor it.
///
/// If the leader's future is dropped, or its work function panics, before an outcome is
/// published, the key is released and one of the waiting joiners runs the work instead.
pub struct Coalescer<K, V, E, W> {
    memo: Memo<K, V, E>,
    work: W,
    gate: Option<AdmissionGate>,
}

impl<K, V, E, W> Debug for Coalescer<K, V, E, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coalescer")
            .field("keys", &self.memo.lock().len())
            .field("concurrency_limit", &self.concurrency_limit())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl<K, V, E, W> Coalescer<K, V, E, W> {
    /// Creates a coalescer around `work`, without a concurrency limit.
    ///
    /// `work` receives the leader's cancellation token and the key.
    #[must_use]
    pub fn new<Fut>(work: W) -> Self
    where
        W: Fn(CancellationToken, K) -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        Self {
            memo: SyncMutex::new(HashMap::new()),
            work,
            gate: None,
        }
    }

    /// Limits the number of computations that may run at the same time to `limit`.
    ///
    /// Callers that would start a computation beyond the limit queue until a running one
    /// finishes; [`pending`](Self::pending) reports how many are queued. Taking `&mut self`
    /// means the limit is fixed before the coalescer is shared.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is 0.
    pub fn set_concurrency_limit(&mut self, limit: usize) {
        self.gate = Some(AdmissionGate::new(limit));
    }

    /// Builder-style variant of [`set_concurrency_limit`](Self::set_concurrency_limit).
    ///
    /// # Panics
    ///
    /// Panics if `limit` is 0.
    ///
    /// # Examples
    ///
    /// ```
    /// use coalescer::Coalescer;
    ///
    /// let group = Coalescer::new(|_cancel, key: u64| async move { Ok::<_, String>(key * 2) })
    ///     .with_concurrency_limit(4);
    /// assert_eq!(group.concurrency_limit(), Some(4));
    /// ```
    #[must_use]
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.set_concurrency_limit(limit);
        self
    }

    /// The configured concurrency limit, if any.
    #[must_use]
    pub fn concurrency_limit(&self) -> Option<usize> {
        self.gate.as_ref().map(AdmissionGate::capacity)
    }

    /// Number of callers currently queued for the concurrency limit.
    ///
    /// Callers waiting on another caller's computation are not counted. Always 0 without a
    /// limit.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.gate.as_ref().map_or(0, AdmissionGate::waiting)
    }
}

impl<K, V, E, W> Coalescer<K, V, E, W>
where
    K: Clone + Eq + Hash + Debug,
{
    /// Drops the remembered outcome for `key`, so the next call runs the work again.
    ///
    /// Returns true if there was anything to drop. Callers already waiting on a running
    /// computation for `key` still receive its outcome.
    pub fn forget(&self, key: &K) -> bool {
        self.memo.lock().remove(key).is_some()
    }
}

impl<K, V, E, W, Fut> Coalescer<K, V, E, W>
where
    K: Clone + Eq + Hash + Debug,
    V: Clone,
    E: Clone,
    W: Fn(CancellationToken, K) -> Fut,
    Fut: Future<Output = std::result::Result<V, E>>,
{
    /// Returns the outcome of the work function for `key`, running it only if no other call
    /// has done so.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Work`] with a clone of the work function's error, and
    /// [`Error::Cancelled`] if `cancel` fired while this caller was waiting for an admission
    /// permit or for another caller's computation.
    pub async fn work(&self, cancel: &CancellationToken, key: K) -> Result<V, E> {
        loop {
            if let Some(waiter) = self.lookup(&key) {
                match Self::join(&waiter, cancel).await? {
                    Some(result) => return result.map_err(Error::Work),
                    None => continue,
                }
            }

            let permit = match &self.gate {
                Some(gate) => match gate.admit(cancel).await {
                    Some(permit) => Some(permit),
                    None => {
                        tracing::debug!(coalescer.key = ?key, "coalescer.admission.cancelled");
                        return Err(Error::Cancelled);
                    }
                },
                None => None,
            };

            // Somebody may have started the same key while this caller was queued.
            let role = match self.memo.lock().entry(key.clone()) {
                Entry::Occupied(occupied) => Role::Join(Arc::clone(occupied.get())),
                Entry::Vacant(vacant) => Role::Lead(Arc::clone(vacant.insert(Arc::new(Waiter::new())))),
            };

            match role {
                Role::Lead(waiter) => {
                    let leader = Leader {
                        memo: &self.memo,
                        key: &key,
                        waiter: Some(waiter),
                    };
                    let result = (self.work)(cancel.clone(), key.clone()).await;
                    leader.publish(result.clone());
                    drop(permit);
                    return result.map_err(Error::Work);
                }
                Role::Join(waiter) => {
                    drop(permit);
                    match Self::join(&waiter, cancel).await? {
                        Some(result) => return result.map_err(Error::Work),
                        None => continue,
                    }
                }
            }
        }
    }

    fn lookup(&self, key: &K) -> Option<Arc<Waiter<V, E>>> {
        self.memo.lock().get(key).map(Arc::clone)
    }

    /// Waits for another caller's outcome. `Ok(None)` means that caller gave up and the
    /// lookup has to start over.
    async fn join(
        waiter: &Waiter<V, E>,
        cancel: &CancellationToken,
    ) -> Result<Option<std::result::Result<V, E>>, E> {
        tokio::select! {
            biased;
            outcome = waiter.wait() => Ok(outcome),
            () = cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

enum Role<V, E> {
    Lead(Arc<Waiter<V, E>>),
    Join(Arc<Waiter<V, E>>),
}

/// Publishes the leader's outcome, or releases the key if the leader never gets that far.
struct Leader<'a, K, V, E>
where
    K: Eq + Hash + Debug,
{
    memo: &'a Memo<K, V, E>,
    key: &'a K,
    waiter: Option<Arc<Waiter<V, E>>>,
}

impl<K, V, E> Leader<'_, K, V, E>
where
    K: Eq + Hash + Debug,
{
    fn publish(mut self, result: std::result::Result<V, E>) {
        if let Some(waiter) = self.waiter.take() {
            waiter.publish(result);
        }
    }
}

impl<K, V, E> Drop for Leader<'_, K, V, E>
where
    K: Eq + Hash + Debug,
{
    fn drop(&mut self) {
        let Some(waiter) = self.waiter.take() else {
            return;
        };

        tracing::debug!(coalescer.key = ?self.key, "coalescer.leader.abandoned");

        {
            let mut memo = self.memo.lock();
            if memo.get(self.key).is_some_and(|current| Arc::ptr_eq(current, &waiter)) {
                memo.remove(self.key);
            }
        }
        waiter.abandon();
    }
}
