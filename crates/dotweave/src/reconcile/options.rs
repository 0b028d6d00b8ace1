//! Per-run switches and the cancellation token checked between files.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Run every decision but perform no filesystem or store mutation.
    pub dry_run: bool,
    /// Re-render every template and write it verbatim, skipping the
    /// unchanged check and the merge.
    pub force_render: bool,
}

/// Cooperative cancellation flag shared between the driver and whoever
/// wants to stop it. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Cancels this token on Ctrl-C. Only one handler can be installed per
    /// process.
    pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            log::warn!("Interrupt received, stopping after the current file");
            token.cancel();
        })
    }
}
