// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Background purge of expired entries in the in-process backend.
//!
//! Lazy expiry already hides dead entries from readers; the sweeper only
//! bounds memory. Uses `tokio_util::sync::CancellationToken` for graceful
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::MemoryBackend;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub struct ExpirySweeper {
    backend: Arc<MemoryBackend>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self {
            backend,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "expiry sweeper starting");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    let purged = self.backend.purge_expired();
                    if purged > 0 {
                        debug!(purged, remaining = self.backend.len(), "purged expired entries");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("expiry sweeper shutting down");
                    return;
                }
            }
        }
    }
}
