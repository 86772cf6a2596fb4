//! Batch destinations
//!
//! A [`Sink`] accepts one [`Batch`] at a time and reports whether it was
//! accepted. `Ok(false)` means the destination answered and refused; an `Err`
//! means it could not be reached. The [`Forwarder`](crate::forwarder::Forwarder)
//! retries only the latter.

mod elasticsearch;
mod stdout;

pub use elasticsearch::ElasticsearchSink;
pub use stdout::{StdoutSink, StreamSink};

use async_trait::async_trait;
use horang_common::{Batch, Result};

#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &str;

    /// Deliver every record of the batch
    async fn deliver(&self, batch: &Batch) -> Result<bool>;
}
