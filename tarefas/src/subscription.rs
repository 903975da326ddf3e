//! Cancellable listener handles.

use tokio::task::JoinHandle;

/// A registered listener backed by a background task.
///
/// [`close`](Self::close) stops delivery. Dropping the handle closes it
/// too, so a listener never outlives its owner.
#[derive(Debug)]
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wraps the task that feeds the listener.
    #[must_use]
    pub const fn new(handle: JoinHandle<()>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Stops the listener. A callback already running on another worker
    /// finishes; no new one starts.
    pub fn close(mut self) {
        self.abort();
    }

    /// Returns `true` once the feeding task has ended, by close or by error.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.abort();
    }
}
