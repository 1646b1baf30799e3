//! Deadlines for whole comparisons.
//!
//! A comparison has no side effects, so a caller that needs cancellation runs
//! it under a deadline and discards whatever was in flight when it expires.

use crate::error::{AbiError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

/// Default deadline in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300; // 5 minutes

/// Timeout configuration for one operation
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Maximum duration for the operation
    pub duration: Duration,
    /// Whether to log when the deadline fires
    pub log_warnings: bool,
    /// Operation name for logging
    pub operation_name: String,
}

impl TimeoutConfig {
    pub fn new(seconds: u64, operation: impl Into<String>) -> Self {
        Self {
            duration: Duration::from_secs(seconds),
            log_warnings: true,
            operation_name: operation.into(),
        }
    }

    pub fn default_timeout(operation: impl Into<String>) -> Self {
        Self::new(DEFAULT_TIMEOUT_SECONDS, operation)
    }
}

/// Execute an async operation with a timeout
pub async fn with_timeout<T, F>(config: TimeoutConfig, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    debug!(
        operation = %config.operation_name,
        seconds = config.duration.as_secs(),
        "Starting operation under deadline"
    );

    match timeout(config.duration, future).await {
        Ok(result) => result,
        Err(_) => {
            if config.log_warnings {
                error!(
                    operation = %config.operation_name,
                    seconds = config.duration.as_secs(),
                    "Operation timed out"
                );
            }
            Err(AbiError::Timeout {
                seconds: config.duration.as_secs(),
            })
        }
    }
}

/// Run a blocking operation on a worker thread under `config`'s deadline.
///
/// On expiry the worker is detached and its eventual result dropped.
pub fn run_blocking<T, F>(config: TimeoutConfig, operation: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let result = runtime.block_on(with_timeout(config, async move {
        tokio::task::spawn_blocking(operation)
            .await
            .map_err(|e| AbiError::Internal(format!("comparison worker failed: {}", e)))?
    }));
    // Dropping the runtime would wait for a still-running worker.
    runtime.shutdown_background();
    result
}
