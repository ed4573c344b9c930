// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! One-shot broadcast of a computation's outcome.

use tokio::sync::watch;

#[derive(Debug)]
enum Slot<V, E> {
    Pending,
    Ready(Result<V, E>),
    /// The computing caller went away without producing a result.
    Abandoned,
}

/// Holds the outcome of one computation and wakes everybody waiting for it.
///
/// The slot moves out of `Pending` at most once. Waiters that subscribe after that observe the
/// final state immediately.
#[derive(Debug)]
pub(crate) struct Waiter<V, E> {
    slot: watch::Sender<Slot<V, E>>,
}

impl<V, E> Waiter<V, E> {
    pub(crate) fn new() -> Self {
        Self {
            slot: watch::Sender::new(Slot::Pending),
        }
    }

    /// Records the outcome and wakes all waiters.
    pub(crate) fn publish(&self, result: Result<V, E>) {
        self.settle(Slot::Ready(result));
    }

    /// Wakes all waiters without an outcome so they can start over.
    pub(crate) fn abandon(&self) {
        self.settle(Slot::Abandoned);
    }

    fn settle(&self, outcome: Slot<V, E>) {
        self.slot.send_if_modified(|slot| {
            if matches!(slot, Slot::Pending) {
                *slot = outcome;
                true
            } else {
                false
            }
        });
    }
}

impl<V: Clone, E: Clone> Waiter<V, E> {
    /// Waits for the outcome. Returns `None` if the computation was abandoned.
    pub(crate) async fn wait(&self) -> Option<Result<V, E>> {
        let mut receiver = self.slot.subscribe();
        let slot = receiver
            .wait_for(|slot| !matches!(slot, Slot::Pending))
            .await
            .ok()?;

        match &*slot {
            Slot::Ready(result) => Some(result.clone()),
            Slot::Pending | Slot::Abandoned => None,
        }
    }
}
