use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared abort switch checked between peers.
///
/// Clones observe the same flag, so a caller can keep one handle and pass
/// another to a running batch.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
