//! The interpreter lock, modeled as a borrowable capability (design note, §9).
//!
//! The hosted runtime enforces a process-wide mutual-exclusion lock: only one thread
//! may execute app code (or touch an app-provided value) at a time. `acquire` returns a
//! [`Token`]; dropping it releases the lock. Blocking APIs that must run "under" the
//! lock take `&Token` so a caller cannot reach them without having acquired one first.
//! This crate's app bridge never performs socket I/O while holding a token (the whole
//! response is framed into memory first, then written after the token is dropped — see
//! `app/mod.rs`'s module doc), so the lock never has to arbitrate between async I/O and
//! a blocking path; it only ever serializes calls into the hosted app.

use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

/// Process-wide interpreter lock. Shared across every worker executor via `Arc`.
#[derive(Clone)]
pub struct InterpreterLock {
    inner: Arc<AsyncMutex<()>>,
}

impl InterpreterLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Acquire the lock, suspending the calling coroutine if another executor currently
    /// holds it. Returns a token whose drop releases it.
    pub async fn acquire(&self) -> Token {
        let guard = self.inner.clone().lock_owned().await;
        Token {
            _guard: guard,
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Default for InterpreterLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that the interpreter lock is held by the current coroutine. `!Send` by
/// construction (`Rc`-shaped marker) so it cannot be carried across an `.await` that
/// might resume on another OS thread without the compiler at least making that
/// transfer visible at every yield point.
pub struct Token {
    _guard: tokio::sync::OwnedMutexGuard<()>,
    _not_send: std::marker::PhantomData<Rc<()>>,
}

impl Token {
    /// No-op marker method: blocking APIs in this crate that must run "under" the lock
    /// take `&Token` as their first argument, documenting at the call site that the
    /// calling coroutine currently owns the interpreter.
    pub fn held(&self) {}
}
