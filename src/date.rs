//! Low resolution cached HTTP date, updated on a timer to avoid a syscall per response.
//!
//! Grounded on `xitca-http`'s `date.rs`: a background task refreshes a shared byte buffer
//! every 500ms and every response borrows the current slice instead of formatting a new one.

use std::{
    cell::RefCell,
    fmt::{self, Write},
    rc::Rc,
    time::{Duration, SystemTime},
};

use httpdate::HttpDate;
use tokio::{task::JoinHandle, time::interval};

pub const DATE_VALUE_LENGTH: usize = 29;

#[derive(Copy, Clone)]
pub struct DateTimeState {
    bytes: [u8; DATE_VALUE_LENGTH],
}

impl DateTimeState {
    pub fn new() -> Self {
        let mut state = Self {
            bytes: [0; DATE_VALUE_LENGTH],
        };
        let _ = write!(state, "{}", HttpDate::from(SystemTime::now()));
        state
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for DateTimeState {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for DateTimeState {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if s.len() != DATE_VALUE_LENGTH {
            return Err(fmt::Error);
        }
        self.bytes.copy_from_slice(s.as_bytes());
        Ok(())
    }
}

/// Per-worker date cache. Lives on the `LocalSet` of one executor; `!Send` by construction
/// (`Rc`), matching the Connection-pinned-to-one-executor rule of the reactor pool.
pub struct DateService {
    state: Rc<RefCell<DateTimeState>>,
    handle: JoinHandle<()>,
}

impl Drop for DateService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl DateService {
    pub fn new() -> Self {
        let state = Rc::new(RefCell::new(DateTimeState::new()));
        let state_clone = Rc::clone(&state);
        let handle = tokio::task::spawn_local(async move {
            let mut tick = interval(Duration::from_millis(500));
            loop {
                tick.tick().await;
                *state_clone.borrow_mut() = DateTimeState::new();
            }
        });
        Self { state, handle }
    }

    #[inline]
    pub fn with_date<F, O>(&self, f: F) -> O
    where
        F: FnOnce(&[u8]) -> O,
    {
        f(self.state.borrow().as_bytes())
    }
}

impl Default for DateService {
    fn default() -> Self {
        Self::new()
    }
}
