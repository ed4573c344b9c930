// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Runs a keyed async computation once and shares its outcome with every caller.
//!
//! [`Coalescer`] owns a work function and memoizes its outcome per key. The first caller for a
//! key runs the work; everybody else who asks for that key, while it runs or afterwards, gets a
//! clone of the same outcome.
//!
//! # When to Use
//!
//! - **Expensive lookups** requested concurrently with identical parameters
//! - **Rate-limited backends** where duplicate calls are wasted quota
//! - **Warm-up** of values that never change for the lifetime of the process
//!
//! Outcomes are never evicted on their own, errors included. Use [`Coalescer::forget`] to run a
//! key again.
//!
//! # Example
//!
//! ```
//! use std::sync::{
//!     Arc,
//!     atomic::{AtomicUsize, Ordering},
//! };
//!
//! use coalescer::Coalescer;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let calls = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&calls);
//! let group = Coalescer::new(move |_cancel, key: &'static str| {
//!     let counter = Arc::clone(&counter);
//!     async move {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!         Ok::<_, String>(format!("profile of {key}"))
//!     }
//! });
//!
//! let cancel = CancellationToken::new();
//! let (a, b) = tokio::join!(group.work(&cancel, "alice"), group.work(&cancel, "alice"));
//! assert_eq!(a, b);
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//! # }
//! ```
//!
//! # Bounded Concurrency
//!
//! With [`Coalescer::set_concurrency_limit`], at most N computations for distinct keys run at a
//! time. Further callers queue for a permit, cancellably, and [`Coalescer::pending`] reports the
//! length of that queue.

mod admission;
mod coalescer;
mod error;
mod waiter;

#[doc(inline)]
pub use coalescer::Coalescer;
#[doc(inline)]
pub use error::{Error, Result};
