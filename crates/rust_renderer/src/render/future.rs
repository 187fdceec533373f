//! Results produced by the render thread
//!
//! Every request that expects an answer carries a [`Promise`]; the caller
//! keeps the matching [`RenderFuture`]. A promise dropped without being
//! fulfilled (the renderer stopped, the message was discarded) resolves its
//! future with [`RenderError::Shutdown`], so no waiter hangs.

use crate::foundation::sync::{is_render_thread, Completion};
use crate::render::{RenderError, RenderResult};
use std::sync::Arc;
use std::time::Duration;

/// Handle to a value the render thread will produce
///
/// Cloning shares the same result.
#[derive(Debug)]
pub struct RenderFuture<T: Clone> {
    completion: Arc<Completion<RenderResult<T>>>,
}

impl<T: Clone> Clone for RenderFuture<T> {
    fn clone(&self) -> Self {
        Self {
            completion: Arc::clone(&self.completion),
        }
    }
}

/// Producer side of a [`RenderFuture`]
pub(crate) struct Promise<T: Clone> {
    completion: Arc<Completion<RenderResult<T>>>,
}

impl<T: Clone> Promise<T> {
    /// Deliver the result
    pub(crate) fn fulfil(self, result: RenderResult<T>) {
        self.completion.complete(result);
    }
}

impl<T: Clone> Drop for Promise<T> {
    fn drop(&mut self) {
        // No-op once fulfilled
        self.completion.complete(Err(RenderError::Shutdown));
    }
}

impl<T: Clone> RenderFuture<T> {
    /// Future and the promise that resolves it
    pub(crate) fn pending() -> (Self, Promise<T>) {
        let completion = Arc::new(Completion::new());
        (
            Self {
                completion: Arc::clone(&completion),
            },
            Promise { completion },
        )
    }

    /// Future that is already resolved
    pub fn resolved(result: RenderResult<T>) -> Self {
        let (future, promise) = Self::pending();
        promise.fulfil(result);
        future
    }

    /// Whether the render thread has delivered a result
    pub fn is_done(&self) -> bool {
        self.completion.is_done()
    }

    /// Result, if delivered
    pub fn try_get(&self) -> Option<RenderResult<T>> {
        self.completion.try_get()
    }

    /// Block until the render thread delivers
    ///
    /// Refuses with [`RenderError::WouldDeadlock`] when called on the render
    /// thread itself.
    pub fn block_until_done(&self) -> RenderResult<T> {
        if is_render_thread() && !self.is_done() {
            return Err(RenderError::WouldDeadlock);
        }
        self.completion.wait()
    }

    /// Block for at most `timeout`; `None` if still pending
    pub fn wait_timeout(&self, timeout: Duration) -> Option<RenderResult<T>> {
        if is_render_thread() && !self.is_done() {
            return Some(Err(RenderError::WouldDeadlock));
        }
        self.completion.wait_timeout(timeout)
    }
}
