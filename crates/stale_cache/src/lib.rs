// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A keyed stale-while-revalidate cache for expensive, fallible computations.
//!
//! [`StaleCache`] remembers the last successful result of a computation per key. Once that result
//! is older than the caller's TTL it keeps being served while a single background task
//! recomputes it, so readers of a warm key never wait on the computation.
//!
//! # When to Use
//!
//! Use `StaleCache` in front of slow lookups whose results may be slightly out of date, such as
//! endpoint discovery, configuration fetched over the network or aggregate queries. Callers get:
//!
//! - **One computation per cold key**: concurrent readers of a key without a value wait for the
//!   first caller's computation instead of starting their own.
//! - **Non-blocking refresh**: stale values are returned immediately and refreshed at most once
//!   at a time per key.
//! - **Last known good value**: a failed background refresh never replaces or hides the previous
//!   value; it is logged through [`tracing`](https://docs.rs/tracing).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use stale_cache::StaleCache;
//! use tick::ClockControl;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let control = ClockControl::new();
//! let cache = StaleCache::<&str, String, String>::new(control.to_clock());
//! let ttl = Duration::from_secs(30);
//!
//! let v1 = cache.get(&"region", ttl, || async { Ok("eu-west".to_string()) }).await;
//! assert_eq!(v1.as_deref(), Ok("eu-west"));
//!
//! control.advance(ttl);
//!
//! // Stale: the old value comes back right away and a refresh runs in the background.
//! let v2 = cache.get(&"region", ttl, || async { Ok("us-east".to_string()) }).await;
//! assert_eq!(v2.as_deref(), Ok("eu-west"));
//! # }
//! ```
//!
//! # Time
//!
//! Staleness is measured with a [`tick::Clock`], so tests can drive it with
//! `tick::ClockControl` instead of sleeping.

mod builder;
mod cache;
mod entry;
mod refresh;
#[cfg(test)]
mod testing;

#[doc(inline)]
pub use builder::StaleCacheBuilder;
#[doc(inline)]
pub use cache::StaleCache;
