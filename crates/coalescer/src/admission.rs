// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bounded admission of new computations.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

/// Limits how many computations may run at once.
///
/// Only callers that start a computation pass through the gate. Callers that join an existing
/// computation never take a permit.
#[derive(Debug)]
pub(crate) struct AdmissionGate {
    permits: Semaphore,
    capacity: usize,
    waiting: AtomicUsize,
}

impl AdmissionGate {
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "concurrency limit must be at least 1");
        Self {
            permits: Semaphore::new(capacity),
            capacity,
            waiting: AtomicUsize::new(0),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of callers currently queued in [`admit`](Self::admit).
    pub(crate) fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Waits for a permit. Returns `None` if `cancel` fires first.
    ///
    /// The permit goes back to the gate when dropped.
    pub(crate) async fn admit(&self, cancel: &CancellationToken) -> Option<SemaphorePermit<'_>> {
        let _queued = Queued::enter(&self.waiting);

        tokio::select! {
            biased;
            permit = self.permits.acquire() => {
                Some(permit.expect("the admission semaphore is never closed"))
            }
            () = cancel.cancelled() => None,
        }
    }
}

/// Counts a caller as waiting for as long as it is alive.
struct Queued<'a>(&'a AtomicUsize);

impl<'a> Queued<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for Queued<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
