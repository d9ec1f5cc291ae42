//! Task spawning.

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle};

/// Spawns a future onto the Tokio executor.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}
