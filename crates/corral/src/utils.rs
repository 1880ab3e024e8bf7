use tokio::task::JoinHandle;

/// Aborts the wrapped task when dropped.
///
/// Used for background tasks whose lifetime is tied to a scope, like the
/// lease renewal tick.
pub(crate) struct CancelOnDrop<T> {
    handle: JoinHandle<T>,
}

impl<T> CancelOnDrop<T> {
    pub fn new(handle: JoinHandle<T>) -> Self {
        CancelOnDrop { handle }
    }
}

impl<T> Drop for CancelOnDrop<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
