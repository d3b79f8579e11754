pub mod http;

pub use http::*;

use async_trait::async_trait;

use crate::{error::Result, events::Event};

/// Delivers one batch to the ingestion endpoint. Any `Err` counts as a
/// recoverable failure.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, batch: &[Event]) -> Result<()>;
}
