//! Private runtime used by the blocking driver to await token minting.
//!
//! Like `postgres` itself, callers of the blocking driver must not be running inside an
//! async runtime.

use std::future::Future;
use std::io;
use std::sync::LazyLock;
use tokio::runtime::{Builder, Runtime};

use crate::error::Result;

static RUNTIME: LazyLock<io::Result<Runtime>> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("rdsiam-blocking")
        .enable_all()
        .build()
});

/// Drive `future` to completion on the shared runtime
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    match &*RUNTIME {
        Ok(runtime) => Ok(runtime.block_on(future)),
        Err(e) => Err(io::Error::new(e.kind(), e.to_string()).into()),
    }
}
