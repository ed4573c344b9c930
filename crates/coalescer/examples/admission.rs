// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bounds how many distinct keys are computed at once and shows the admission queue.

use std::{sync::Arc, time::Duration};

use coalescer::{Coalescer, Error};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let group = Arc::new(
        Coalescer::new(|_cancel, id: u32| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, String>(format!("report #{id}"))
        })
        .with_concurrency_limit(2),
    );

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();
    for id in 1..=5 {
        let group = Arc::clone(&group);
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move { (id, group.work(&cancel, id).await) }));
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    println!("queued for admission: {}", group.pending());

    // Stop waiting for anything that has not started yet.
    tokio::time::sleep(Duration::from_millis(120)).await;
    cancel.cancel();

    for handle in handles {
        let (id, outcome) = handle.await.expect("task panicked");
        match outcome {
            Ok(report) => println!("{id}: {report}"),
            Err(Error::Cancelled) => println!("{id}: cancelled while queued"),
            Err(e) => println!("{id}: failed: {e}"),
        }
    }
}
