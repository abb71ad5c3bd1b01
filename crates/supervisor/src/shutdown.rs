// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

/// Single-writer (signal handler) / single-reader (supervisor loop) shutdown
/// indicator. Threaded through the supervisor explicitly rather than stored
/// as process-wide global state, so multiple supervisors can be
/// test-harnessed in one process — the same rationale as `ojd`'s
/// `Notify`-backed shutdown flag in its main loop, simplified here to a
/// polled flag since this engine's loop is not `tokio::select!`-driven.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Spawn a task that sets the flag on the first `SIGINT` or `SIGTERM`
    /// and logs which one fired. Keeping this to flag-setting only (no
    /// further control flow inside the handler task) mirrors spec.md §9's
    /// guidance against signal-driven control flow.
    pub fn install_signal_handlers(&self) -> std::io::Result<()> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let flag = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                }
                _ = sigint.recv() => {
                    info!("received SIGINT, shutting down");
                }
            }
            flag.set();
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_set());
    }

    #[test]
    fn set_is_visible_through_clones() {
        let flag = ShutdownFlag::new();
        let clone = flag.clone();
        clone.set();
        assert!(flag.is_set());
    }
}
