//! A handle to mutate `Server` state from outside the thread blocked in `start()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

#[derive(Clone)]
pub struct ServerHandle {
    pub(super) stop_tx: UnboundedSender<bool>,
    pub(super) running: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Signal `start()`'s blocking call to return. `graceful` controls whether workers
    /// wait out `shutdown_timeout` for in-flight connections to drain before the
    /// thread their executor runs on is joined.
    pub fn stop(&self, graceful: bool) {
        let _ = self.stop_tx.send(graceful);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
