//! Graceful-shutdown wait (§4.A): poll the active-connection counter until it drains
//! or `shutdown_timeout` elapses. A force stop (`is_graceful == false`) skips the wait
//! entirely, mirroring the teacher's `Command::ForceStop` vs `GracefulStop` split.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::info;

use super::Counter;

pub(super) async fn wait_for_drain(counter: &Counter, shutdown_timeout: Duration, is_graceful: &AtomicBool) {
    if !is_graceful.load(Ordering::SeqCst) {
        let remaining = counter.get();
        if remaining > 0 {
            info!("force stopped: {remaining} connection(s) (estimate) left");
        }
        return;
    }

    let start = Instant::now();
    let mut interval = tokio::time::interval(Duration::from_millis(500));
    while start.elapsed() < shutdown_timeout {
        if counter.get() == 0 {
            info!("graceful stopped: all connections drained");
            return;
        }
        interval.tick().await;
    }

    let remaining = counter.get();
    if remaining > 0 {
        info!("graceful shutdown timed out: {remaining} connection(s) (estimate) left");
    }
}
