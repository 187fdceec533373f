//! Cross-thread signalling primitives
//!
//! Blocking waits are only legal off the render thread. The render thread
//! marks itself with [`mark_render_thread`] so waits can refuse instead of
//! deadlocking.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

thread_local! {
    static IS_RENDER_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Flag the current thread as the render thread
pub fn mark_render_thread() {
    IS_RENDER_THREAD.with(|flag| flag.set(true));
}

/// Whether the current thread is the render thread
pub fn is_render_thread() -> bool {
    IS_RENDER_THREAD.with(Cell::get)
}

/// Text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("unknown panic"))
}

/// Run `f`, turning a panic into its message
///
/// State `f` touched may be left half-updated; callers only use this where
/// that state is dropped or rebuilt afterwards.
pub fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

/// Lock a mutex, ignoring poisoning
///
/// A panic on another thread must not take the render loop down with it;
/// the protected data here is always left consistent between statements.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared lock of an `RwLock`, ignoring poisoning
pub fn read<T>(rw: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rw.read().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive lock of an `RwLock`, ignoring poisoning
pub fn write<T>(rw: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rw.write().unwrap_or_else(PoisonError::into_inner)
}

/// Write-once value with blocking waiters
#[derive(Debug)]
pub struct Completion<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Condvar::new(),
        }
    }
}

impl<T: Clone> Completion<T> {
    /// Create an unresolved completion
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the completion and wake every waiter
    ///
    /// Returns false if it was already resolved; the first value wins.
    pub fn complete(&self, value: T) -> bool {
        let mut slot = lock(&self.value);
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        drop(slot);
        self.ready.notify_all();
        true
    }

    /// Whether a value has been set
    pub fn is_done(&self) -> bool {
        lock(&self.value).is_some()
    }

    /// Non-blocking read
    pub fn try_get(&self) -> Option<T> {
        lock(&self.value).clone()
    }

    /// Block until resolved
    pub fn wait(&self) -> T {
        let mut slot = lock(&self.value);
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until resolved or the timeout elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let slot = lock(&self.value);
        let (slot, _) = self
            .ready
            .wait_timeout_while(slot, timeout, |value| value.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.clone()
    }
}

/// Idempotent "redraw needed" flag with a wake-up condition
///
/// Any number of requests between two frames collapse into one wake-up.
#[derive(Debug, Default)]
pub struct RedrawSignal {
    requested: Mutex<bool>,
    wake: Condvar,
}

impl RedrawSignal {
    /// Create a signal with no pending request
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a redraw; a no-op if one is already pending
    pub fn request(&self) {
        let mut requested = lock(&self.requested);
        if !*requested {
            *requested = true;
            self.wake.notify_all();
        }
    }

    /// Clear the flag, returning whether a request was pending
    pub fn take(&self) -> bool {
        std::mem::replace(&mut *lock(&self.requested), false)
    }

    /// Whether a request is pending
    pub fn is_requested(&self) -> bool {
        *lock(&self.requested)
    }

    /// Block until a redraw is requested or the timeout elapses
    ///
    /// Does not clear the flag; the loop clears it at the start of the next
    /// iteration.
    pub fn wait(&self, timeout: Duration) -> bool {
        let requested = lock(&self.requested);
        let (requested, _) = self
            .wake
            .wait_timeout_while(requested, timeout, |requested| !*requested)
            .unwrap_or_else(PoisonError::into_inner);
        *requested
    }
}
