// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Log capture for asserting on events emitted by the cache.

use std::{io::Write, sync::Arc};

use parking_lot::Mutex;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt};

/// Collects the formatted output of every event into a shared buffer.
///
/// Install with `tracing::subscriber::set_default(capture.subscriber())`. The default is
/// thread-local, so this only sees events from tasks polled on the test's thread, which holds
/// for the current-thread runtime used by `#[tokio::test]`.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogCapture {
    lines: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Panics with the captured output unless some event contains `needle`.
    pub(crate) fn assert_contains(&self, needle: &str) {
        let captured = String::from_utf8_lossy(&self.lines.lock()).into_owned();
        assert!(
            captured.contains(needle),
            "no event mentions '{needle}', captured:\n{captured}"
        );
    }

    /// A subscriber that logs every level, without colors, into this capture.
    pub(crate) fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_writer(self.clone())
                .with_ansi(false),
        )
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = Sink;

    fn make_writer(&'a self) -> Self::Writer {
        Sink(Arc::clone(&self.lines))
    }
}

/// Appends to the capture buffer.
pub(crate) struct Sink(Arc<Mutex<Vec<u8>>>);

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
