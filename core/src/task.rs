use std::future::Future;

/// Spawn a task
pub fn spawn<F>(future: F)
where
    F: Future + Send + 'static,
    F::Output: Send,
{
    tokio::spawn(future);
}
