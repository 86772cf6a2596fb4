//! Bounded, retried batch delivery
//!
//! Every attempt runs under a timeout. Transport failures and timeouts are
//! retried with exponential backoff up to the attempt limit; an explicit
//! refusal from the destination is final for this cycle.

use crate::sink::Sink;
use horang_common::Batch;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Ceiling for the delay between two attempts
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl DeliveryPolicy {
    /// Delay before attempt `attempt + 1`, counting from 1
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

pub struct Forwarder {
    sink: Box<dyn Sink>,
    policy: DeliveryPolicy,
}

impl Forwarder {
    pub fn new(sink: Box<dyn Sink>, policy: DeliveryPolicy) -> Self {
        Self { sink, policy }
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// Deliver one batch; true only when the destination accepted it
    pub async fn forward(&self, batch: &Batch) -> bool {
        let source = batch.source().display();
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            let failure = match tokio::time::timeout(self.policy.timeout, self.sink.deliver(batch)).await
            {
                Ok(Ok(true)) => {
                    debug!(
                        source = %source,
                        records = batch.len(),
                        sink = self.sink.name(),
                        attempt,
                        "Batch delivered"
                    );
                    return true;
                }
                Ok(Ok(false)) => {
                    warn!(source = %source, sink = self.sink.name(), "Batch refused by destination");
                    return false;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {:?}", self.policy.timeout),
            };

            if attempt < attempts {
                let delay = self.policy.backoff(attempt);
                warn!(
                    source = %source,
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "Delivery attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            } else {
                error!(
                    source = %source,
                    attempts,
                    error = %failure,
                    "Delivery failed"
                );
            }
        }

        false
    }
}
