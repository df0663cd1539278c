//! CLI command implementations.

pub mod config;
pub mod geocode;
pub mod init;
pub mod show;

use std::future::Future;

use crate::error::CliError;

/// Runs `future` to completion on a single-threaded runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output, CliError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    Ok(runtime.block_on(future))
}
