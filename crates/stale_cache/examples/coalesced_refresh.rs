// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Serves service endpoints from a `StaleCache` whose refreshes share a coalesced region lookup.
//!
//! Every endpoint refresh needs the region the process runs in. The region never changes, so a
//! `Coalescer` resolves it once, no matter how many refreshes ask for it at the same time.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use coalescer::Coalescer;
use stale_cache::StaleCache;
use tick::Clock;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let region_lookups = Arc::new(AtomicU32::new(0));
    let lookups = Arc::clone(&region_lookups);
    let regions = Arc::new(Coalescer::new(move |_cancel, host: String| {
        let lookups = Arc::clone(&lookups);
        async move {
            lookups.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>(format!("eu-west ({host})"))
        }
    }));

    let endpoints = StaleCache::<String, String, String>::builder(Clock::new_tokio())
        .name("endpoints")
        .build();
    let ttl = Duration::from_millis(100);
    let version = Arc::new(AtomicU32::new(0));

    let resolve = |service: &str| {
        let regions = Arc::clone(&regions);
        let version = Arc::clone(&version);
        let service = service.to_string();
        move || async move {
            let region = regions
                .work(&CancellationToken::new(), "localhost".to_string())
                .await
                .map_err(|e| e.to_string())?;
            let v = version.fetch_add(1, Ordering::SeqCst) + 1;
            Ok::<_, String>(format!("https://{service}.{region}/v{v}"))
        }
    };

    for round in 1..=3 {
        for service in ["users", "orders", "billing"] {
            let endpoint = endpoints.get(&service.to_string(), ttl, resolve(service)).await;
            println!("[round {round}] {service}: {endpoint:?}");
        }
        tokio::time::sleep(ttl).await;
    }

    // Give the last round of background refreshes a moment to land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!(
        "\n{} endpoint computations, {} region lookup(s)",
        version.load(Ordering::SeqCst),
        region_lookups.load(Ordering::SeqCst)
    );
}
