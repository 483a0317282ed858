//! Runtime lifecycle for the study runner.
//!
//! A solve that overruns its budget is abandoned on tokio's blocking pool.
//! Dropping a runtime waits for such work, so the runner shuts down with a
//! bounded grace period instead.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tracing::info;

/// Longest wait for abandoned solves once every study has returned.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

pub fn build_runtime() -> io::Result<Runtime> {
    Builder::new_multi_thread().enable_all().build()
}

/// Drives `future` to completion, then stops `runtime` waiting at most
/// `grace` for blocking work that is still running.
pub fn block_on_with_grace<F: Future>(runtime: Runtime, future: F, grace: Duration) -> F::Output {
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    info!(grace_ms = grace.as_millis() as u64, "runtime shut down");
    output
}
