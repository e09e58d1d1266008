//! Thin indirection over the async runtime backing `signode`.
//!
//! Only a `tokio` backend is implemented; the module boundary mirrors the
//! shape of a multi-backend async runtime layer so that call sites never
//! spell out `tokio::` directly.

#[cfg(feature = "async_runtime_tokio")]
pub mod tokio;

#[cfg(feature = "async_runtime_tokio")]
pub use self::tokio::{init, JoinHandle, Runtime};

use std::future::Future;

/// Spawns a new asynchronous task, returning a `JoinHandle` for it.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    #[cfg(feature = "async_runtime_tokio")]
    {
        ::tokio::spawn(future)
    }
}

/// Runs a future to completion on the current thread, blocking it.
pub fn block_on<F: Future>(future: F) -> F::Output {
    #[cfg(feature = "async_runtime_tokio")]
    {
        ::tokio::runtime::Handle::current().block_on(future)
    }
}
