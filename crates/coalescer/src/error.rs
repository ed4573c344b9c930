// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// A specialized `Result` type for [`Coalescer::work`](crate::Coalescer::work).
pub type Result<V, E> = std::result::Result<V, Error<E>>;

/// The reason a call to [`Coalescer::work`](crate::Coalescer::work) produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error<E> {
    /// The caller's cancellation token fired while it was waiting, either for an admission
    /// permit or for another caller's computation.
    ///
    /// The computation itself, if one was running, is unaffected.
    #[error("cancelled while waiting for the result")]
    Cancelled,

    /// The work function failed. Every caller that shares the computation receives a clone of
    /// the same error.
    #[error("work failed: {0}")]
    Work(E),
}

impl<E> Error<E> {
    /// Returns true if the caller gave up waiting.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the work function's error, if that is what this is.
    #[must_use]
    pub fn into_work(self) -> Option<E> {
        match self {
            Self::Work(error) => Some(error),
            Self::Cancelled => None,
        }
    }
}
