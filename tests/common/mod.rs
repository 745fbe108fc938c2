//! Common test infrastructure for `pi_ssh` integration tests.
//!
//! - [`run_async`] drives a future on an asupersync runtime
//! - [`TestHarness`] owns a temp directory with file helpers
//! - [`RemoteFixture`] pairs a "local" and a "remote" root so path
//!   translation is exercised for real over the local shell transport

use std::future::Future;

pub mod harness;

#[allow(unused_imports)]
pub use harness::{RemoteFixture, TestHarness, connect_locally, file_available, rg_available};

/// Runs an async future to completion on an asupersync runtime.
///
/// The future is spawned onto the runtime so it runs with a proper task context.
#[allow(dead_code)]
pub fn run_async<T, Fut>(future: Fut) -> T
where
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let runtime = asupersync::runtime::RuntimeBuilder::new()
        .blocking_threads(1, 8)
        .build()
        .expect("build asupersync runtime");

    let join = runtime.handle().spawn(future);
    runtime.block_on(join)
}
