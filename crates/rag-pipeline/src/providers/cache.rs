//! Answer cache trait

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Key/value store for serialized answers
///
/// Every call is best-effort from the pipeline's point of view: errors are
/// recorded and the run continues.
#[async_trait]
pub trait AnswerCache: Send + Sync {
    /// Read a value; `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value with a time-to-live
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Check the backing store is reachable; reported by the health route
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}
